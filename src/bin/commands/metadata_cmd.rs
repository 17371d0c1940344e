use anyhow::{Context, Result};
use ipmeta::Database;
use serde_json::json;
use std::path::PathBuf;

pub fn cmd_metadata(database: PathBuf) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let mut output = serde_json::to_value(db.metadata())?;
    if let serde_json::Value::Object(ref mut map) = output {
        map.insert("file".to_string(), json!(database.display().to_string()));
        map.insert("data_section_size".to_string(), json!(db.data_section().len()));
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
