use super::Config;
use crate::errors::AppResult;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// Walk `defaults` and collect every dotted key absent from `current`.
fn collect_missing(current: &Mapping, defaults: &Mapping, prefix: &str, out: &mut Vec<String>) {
    for (key, default_val) in defaults {
        let Some(name) = key.as_str() else { continue };
        let dotted = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };

        match (current.get(key), default_val) {
            (None, _) => out.push(dotted),
            (Some(Value::Mapping(cur)), Value::Mapping(def)) => {
                collect_missing(cur, def, &dotted, out)
            }
            _ => {}
        }
    }
}

/// Insert defaults for absent keys, never touching values already present.
fn merge_missing(current: &mut Mapping, defaults: &Mapping) -> usize {
    let mut added = 0;
    for (key, default_val) in defaults {
        match current.get_mut(key) {
            None => {
                current.insert(key.clone(), default_val.clone());
                added += 1;
            }
            Some(Value::Mapping(cur)) => {
                if let Value::Mapping(def) = default_val {
                    added += merge_missing(cur, def);
                }
            }
            Some(_) => {}
        }
    }
    added
}

fn defaults_mapping() -> AppResult<Mapping> {
    let value = serde_yaml::to_value(Config::default())?;
    Ok(value.as_mapping().cloned().unwrap_or_default())
}

fn read_mapping(path: &Path) -> AppResult<Mapping> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)?;
    Ok(value.as_mapping().cloned().unwrap_or_default())
}

/// Keys that the configuration file at `path` does not define.
pub fn missing_keys(path: &Path) -> AppResult<Vec<String>> {
    let current = read_mapping(path)?;
    let mut out = Vec::new();
    collect_missing(&current, &defaults_mapping()?, "", &mut out);
    Ok(out)
}

/// Write the missing keys with their default values back to `path`.
/// Returns how many keys were added.
pub fn migrate_file(path: &Path) -> AppResult<usize> {
    let mut current = read_mapping(path)?;
    let added = merge_missing(&mut current, &defaults_mapping()?);
    if added > 0 {
        fs::write(path, serde_yaml::to_string(&Value::Mapping(current))?)?;
    }
    Ok(added)
}
