use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_documents;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    /// Every fetched document is written in full.
    Full,
    /// The first fetch of each document is written in full, later ones as changes.
    Diffed,
}

/// Appends one JSON object per line for every request, command and fetched document.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    baselines: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            baselines: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        self.record(
            "req",
            json!({ "method": method, "path": path, "body": body }),
        );
    }

    pub fn log_command(&mut self, action: &str, zone: Option<u8>, body: &Value) {
        self.record(
            "cmd",
            json!({ "action": action, "zone": zone, "body": body }),
        );
    }

    /// `document` keys the diff baseline, e.g. `"/systems/sys-1/status"`.
    pub fn log_fetch(&mut self, document: &str, body: &Value) {
        let fields = match self.mode {
            MessageLogMode::Full => json!({ "document": document, "body": body }),
            MessageLogMode::Diffed => {
                let previous = self.baselines.insert(document.to_string(), body.clone());
                match previous {
                    Some(previous) => json!({
                        "document": document,
                        "changes": diff_documents(&previous, body),
                    }),
                    None => json!({ "document": document, "full": true, "body": body }),
                }
            }
        };
        self.record("fetch", fields);
    }

    fn record(&mut self, dir: &str, mut fields: Value) {
        if let Value::Object(entry) = &mut fields {
            entry.insert("ts".to_string(), Utc::now().to_rfc3339().into());
            entry.insert("dir".to_string(), dir.into());
        }
        let written = serde_json::to_string(&fields)
            .map_err(std::io::Error::from)
            .and_then(|line| writeln!(self.file, "{line}"));
        if let Err(e) = written {
            warn!("failed to write message log entry: {e}");
        }
    }
}
