use crate::cli::CacheCommands;
use crate::commands::common::{format_cache_lines, parse_json_arg, CommandContext};
use crate::error::CliError;

pub async fn run_cache(command: CacheCommands, ctx: &CommandContext) -> Result<(), CliError> {
    let cache = ctx.open_cache()?;
    match command {
        CacheCommands::Put {
            key,
            entity_type,
            data,
        } => {
            let data = parse_json_arg("--data", &data)?;
            let entry = cache.save(&key, &data, &entity_type).await?;
            println!("Cached {} ({})", entry.key, entry.entity_type);
        }
        CacheCommands::Get { key } => match cache.get(&key).await? {
            Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
            None => println!("No cached entry for {key}"),
        },
        CacheCommands::Delete { key } => {
            if cache.delete(&key).await? {
                println!("Deleted {key}");
            } else {
                println!("No cached entry for {key}");
            }
        }
        CacheCommands::List { entity_type, json } => {
            let entries = cache.list_entries(entity_type.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("Cache is empty.");
            } else {
                let now_ms = chrono::Utc::now().timestamp_millis();
                for line in format_cache_lines(&entries, now_ms) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}
