use super::{load_config, open_checkpoint_store};
use std::path::Path;

pub async fn inspect(config_path: &Path, profile: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path, profile)?;
    let store = open_checkpoint_store(&config).await?;
    let key = config.checkpoint.key_for(&config.instrument.symbol);

    match store.get(&key).await? {
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => println!("no checkpoint stored under '{key}'"),
    }
    Ok(())
}
