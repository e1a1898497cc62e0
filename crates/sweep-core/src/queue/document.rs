//! Task document schema: `{ name, params, description_file }` plus whatever
//! extra fields a producer chose to write (ignored here).

use std::path::Path;

use serde::Deserialize;

use crate::domain::{NewTask, Params, QueueError, Task};
use crate::ports::TaskDocument;

#[derive(Debug, Deserialize)]
struct TaskBody {
    name: String,
    #[serde(default)]
    params: Params,
    description_file: String,
}

/// Decode a claimed document into a `Task`, resolving a relative
/// `description_file` against `tasks_dir`.
pub(crate) fn decode_task(doc: &TaskDocument, tasks_dir: &Path) -> Result<Task, QueueError> {
    let body: TaskBody = serde_json::from_value(serde_json::Value::Object(doc.body.clone()))
        .map_err(|e| QueueError::MalformedTask {
            id: doc.id.clone(),
            reason: e.to_string(),
        })?;

    if body.description_file.trim().is_empty() {
        return Err(QueueError::MalformedTask {
            id: doc.id.clone(),
            reason: "description_file is empty".to_string(),
        });
    }

    let description = Path::new(&body.description_file);
    let description = if description.is_absolute() {
        description.to_path_buf()
    } else {
        tasks_dir.join(description)
    };

    Ok(Task::new(doc.id.clone(), body.name, body.params, description))
}

pub(crate) fn encode_task(task: &NewTask) -> Params {
    let mut body = Params::new();
    body.insert("name".into(), task.name.clone().into());
    body.insert("params".into(), serde_json::Value::Object(task.params.clone()));
    body.insert(
        "description_file".into(),
        task.description_file.clone().into(),
    );
    body
}
