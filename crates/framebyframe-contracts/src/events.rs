use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

const RESERVED_KEYS: &[&str] = &["type", "session_id", "seq", "ts"];

/// Append-only writer for a session's `events.jsonl`.
///
/// Every line is one compact JSON object carrying `type`, `session_id`, a
/// per-file `seq` and `ts`. Caller payload keys that collide with those are
/// dropped. Writers rebound with [`EventWriter::for_session`] share the file,
/// the lock and the sequence counter.
#[derive(Debug, Clone)]
pub struct EventWriter {
    log: Arc<EventLog>,
    session_id: String,
}

#[derive(Debug)]
struct EventLog {
    path: PathBuf,
    next_seq: AtomicU64,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            log: Arc::new(EventLog {
                path: path.into(),
                next_seq: AtomicU64::new(0),
                lock: Mutex::new(()),
            }),
            session_id: session_id.into(),
        }
    }

    pub fn for_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            log: Arc::clone(&self.log),
            session_id: session_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.log.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        if let Some(parent) = self.log.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let _guard = self
            .log
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let seq = self.log.next_seq.fetch_add(1, Ordering::SeqCst);

        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.session_id.clone()),
        );
        event.insert("seq".to_string(), Value::Number(seq.into()));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            event.insert(key, value);
        }

        let line = serde_json::to_string(&event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Reads back every well-formed line of an events file.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect())
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
