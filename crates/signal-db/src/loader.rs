use crate::{DatabaseError, MessageDef, SignalDatabase};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// On-disk shape of a database descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
struct DatabaseDescriptor {
    #[serde(default)]
    messages: Vec<MessageDef>,
}

pub fn parse_database_yaml(raw: &str) -> Result<SignalDatabase, DatabaseError> {
    let messages = parse_yaml_messages(raw, Path::new("<inline>"))?;
    SignalDatabase::new(messages)
}

pub fn parse_database_json(raw: &str) -> Result<SignalDatabase, DatabaseError> {
    let messages = parse_json_messages(raw, Path::new("<inline>"))?;
    SignalDatabase::new(messages)
}

/// Load one descriptor; `.json` files are read as JSON, anything else as YAML.
pub fn load_database_file(path: impl AsRef<Path>) -> Result<SignalDatabase, DatabaseError> {
    let path = path.as_ref();
    let db = SignalDatabase::new(read_messages(path)?)?;
    info!(path = %path.display(), messages = db.len(), "signal database loaded");
    Ok(db)
}

/// Merge every `*.yml`, `*.yaml` and `*.json` descriptor in `dir`, in file-name order.
pub fn load_database_dir(dir: impl AsRef<Path>) -> Result<SignalDatabase, DatabaseError> {
    let dir = dir.as_ref();
    let io_err = |source| DatabaseError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" || ext == "json" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    let mut messages = Vec::new();
    for p in &entries {
        messages.extend(read_messages(p)?);
    }
    let db = SignalDatabase::new(messages)?;
    info!(
        dir = %dir.display(),
        files = entries.len(),
        messages = db.len(),
        "signal database loaded"
    );
    Ok(db)
}

fn read_messages(path: &Path) -> Result<Vec<MessageDef>, DatabaseError> {
    let raw = fs::read_to_string(path).map_err(|source| DatabaseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if path.extension().map_or(false, |e| e == "json") {
        parse_json_messages(&raw, path)
    } else {
        parse_yaml_messages(&raw, path)
    }
}

fn parse_yaml_messages(raw: &str, path: &Path) -> Result<Vec<MessageDef>, DatabaseError> {
    let desc: DatabaseDescriptor =
        serde_yaml::from_str(raw).map_err(|source| DatabaseError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(desc.messages)
}

fn parse_json_messages(raw: &str, path: &Path) -> Result<Vec<MessageDef>, DatabaseError> {
    let desc: DatabaseDescriptor =
        serde_json::from_str(raw).map_err(|source| DatabaseError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(desc.messages)
}
