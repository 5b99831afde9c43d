use serde::Serialize;
use serde_json::Value;

/// One leaf that differs between two JSON documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Change {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

/// Leaf-level differences keyed by dotted path. A key present on only one
/// side is reported against `null`, with nested objects expanded to leaves.
pub(crate) fn diff_documents(old: &Value, new: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    walk(Some(old), Some(new), "", &mut changes);
    changes
}

/// Dotted paths of leaves that differ between two serializable values.
pub(crate) fn changed_paths<T: Serialize>(old: &T, new: &T) -> Vec<String> {
    let (Ok(old), Ok(new)) = (serde_json::to_value(old), serde_json::to_value(new)) else {
        return vec![];
    };
    diff_documents(&old, &new)
        .into_iter()
        .map(|change| change.path)
        .collect()
}

fn walk(old: Option<&Value>, new: Option<&Value>, path: &str, out: &mut Vec<Change>) {
    match (old, new) {
        (Some(Value::Object(old)), Some(Value::Object(new))) => {
            let added = new.keys().filter(|k| !old.contains_key(*k));
            for key in old.keys().chain(added) {
                walk(old.get(key), new.get(key), &join(path, key), out);
            }
        }
        (None, Some(Value::Object(new))) => {
            for (key, value) in new {
                walk(None, Some(value), &join(path, key), out);
            }
        }
        (Some(Value::Object(old)), None) => {
            for (key, value) in old {
                walk(Some(value), None, &join(path, key), out);
            }
        }
        (old, new) if old != new => out.push(Change {
            path: path.to_string(),
            old: old.cloned().unwrap_or(Value::Null),
            new: new.cloned().unwrap_or(Value::Null),
        }),
        _ => {}
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
