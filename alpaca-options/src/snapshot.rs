//! Results file: `{"options": [...]}` with one flat record per contract.
//!
//! Loading goes through the defensive decoder, so files written by older
//! tools with missing or string-typed fields still load.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::data::{decode_stored, Contract};
use crate::error::{FetchError, Result};

pub const OPTIONS_KEY: &str = "options";

#[derive(Serialize)]
struct OptionsFile<'a> {
    options: &'a [Contract],
}

/// Write contracts to `path`, creating parent directories as needed.
pub fn save_options(path: impl AsRef<Path>, contracts: &[Contract]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(&OptionsFile { options: contracts })?;
    fs::write(path, content)?;
    info!("Saved {} options to {}", contracts.len(), path.display());
    Ok(())
}

/// Read contracts back from a results file.
pub fn load_options(path: impl AsRef<Path>) -> Result<Vec<Contract>> {
    let content = fs::read_to_string(path.as_ref())?;
    let value: Value = serde_json::from_str(&content)?;
    parse_options(&value)
}

/// Decode the `options` array of a results document; non-object entries are skipped.
pub fn parse_options(value: &Value) -> Result<Vec<Contract>> {
    let entries = value
        .get(OPTIONS_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::malformed("options array not found"))?;

    let contracts: Vec<Contract> = entries.iter().filter_map(decode_stored).collect();
    if contracts.len() < entries.len() {
        debug!("Skipped {} malformed option records", entries.len() - contracts.len());
    }
    Ok(contracts)
}
