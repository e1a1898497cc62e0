//! Run config assembly: task params, then the description file on top.

use std::path::Path;

use crate::domain::{Params, Task, TaskFailure};

/// Read a description file as a mapping. `.yaml` / `.yml` are parsed as YAML,
/// everything else as JSON.
pub async fn load_description(path: &Path) -> Result<Params, TaskFailure> {
    let unreadable = |reason: String| TaskFailure::DescriptionUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value: serde_json::Value = if is_yaml {
        serde_yaml::from_str(&raw).map_err(|e| unreadable(e.to_string()))?
    } else {
        serde_json::from_str(&raw).map_err(|e| unreadable(e.to_string()))?
    };

    match value {
        serde_json::Value::Object(map) => Ok(map),
        // an empty YAML document
        serde_json::Value::Null => Ok(Params::new()),
        other => Err(unreadable(format!(
            "expected a mapping at the top level, got {}",
            kind_of(&other)
        ))),
    }
}

/// Merge `overlay` into `base`. Nested mappings are merged key by key; any
/// other value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: &mut Params, overlay: Params) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// `task.params` with the description file merged over it.
pub async fn build_run_config(task: &Task) -> Result<Params, TaskFailure> {
    let description = load_description(task.description_file()).await?;
    let mut config = task.params().clone();
    deep_merge(&mut config, description);
    Ok(config)
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a sequence",
        serde_json::Value::Object(_) => "a mapping",
    }
}
