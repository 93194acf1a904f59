use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::diff::diff_json;
use crate::protocol::Frame;

/// How inbound status frames are written to the message log.
pub enum MessageLogMode {
    /// Every frame body verbatim.
    Full,
    /// First frame in full, then only the changed leaves.
    Diffed,
}

/// NDJSON log of the traffic exchanged with the unit.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_state: Option<Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_state: None,
        })
    }

    pub fn log_command(&mut self, frame: &Frame, attempt: u32) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "tx",
            "seq": frame.sequence.value(),
            "attempt": attempt,
            "body": serde_json::from_str::<Value>(&frame.body).unwrap_or(Value::Null),
        });
        self.write_line(&entry);
    }

    pub fn log_connection(&mut self, state: &str, address: Option<String>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "conn",
            "state": state,
            "address": address,
        });
        self.write_line(&entry);
    }

    pub fn log_frame(&mut self, frame: &Frame) {
        let body: Value = match serde_json::from_str(&frame.body) {
            Ok(v) => v,
            Err(_) => {
                let entry = json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "rx",
                    "seq": frame.sequence.value(),
                    "raw": frame.body,
                });
                self.write_line(&entry);
                return;
            }
        };

        match self.mode {
            MessageLogMode::Full => {
                let entry = json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "rx",
                    "seq": frame.sequence.value(),
                    "body": body,
                });
                self.write_line(&entry);
            }
            MessageLogMode::Diffed => {
                let entry = match self.previous_state.as_ref() {
                    None => json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "rx",
                        "seq": frame.sequence.value(),
                        "full": true,
                        "body": body,
                    }),
                    Some(prev) => {
                        let mut changes = Vec::new();
                        diff_json(prev, &body, "", &mut changes);
                        let change_entries: Vec<Value> = changes
                            .iter()
                            .map(|c| json!({ "path": c.path, "old": c.old, "new": c.new }))
                            .collect();
                        json!({
                            "ts": Utc::now().to_rfc3339(),
                            "dir": "rx",
                            "seq": frame.sequence.value(),
                            "changes": change_entries,
                        })
                    }
                };
                self.write_line(&entry);
                self.previous_state = Some(body);
            }
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}
