//! Write-only diagnostic sinks for consumer payloads
//!
//! A tracer receives already redacted payloads and never hands anything back.

use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::declaration::TraceSetting;

/// Keys whose values never reach a tracer
const SECRET_KEYS: &[&str] = &["passphrase", "password", "token", "secret", "apiKey"];

const REDACTED: &str = "*****";

/// Write-only payload sink keyed by a per-instance trace identifier
#[cfg_attr(test, mockall::automock)]
pub trait Tracer: Send + Sync {
    /// Record one payload. Failures are logged, never returned.
    fn write(&self, payload: &Value);
}

/// Tracer appending timestamped JSON lines to a file
pub struct FileTracer {
    id: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl FileTracer {
    pub fn open(id: impl Into<String>, path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create trace directory: {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open trace file: {:?}", path))?;

        Ok(Self {
            id: id.into(),
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Trace identifier, e.g. "Splunk.finance::splunk1"
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Tracer for FileTracer {
    fn write(&self, payload: &Value) {
        let line = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "data": payload,
        });

        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(e) = writeln!(file, "{}", line) {
            tracing::warn!("Tracer '{}' failed to write to {:?}: {}", self.id, self.path, e);
        }
    }
}

/// Build the tracer for a consumer, if tracing is enabled for it
///
/// `trace: true` writes to `<trace_dir>/<trace_id>`, `trace: "<path>"` writes
/// to the given path.
pub fn tracer_for(
    setting: &TraceSetting,
    trace_id: &str,
    trace_dir: &Path,
) -> Option<Arc<dyn Tracer>> {
    let path = match setting {
        TraceSetting::Enabled(false) => return None,
        TraceSetting::Enabled(true) => trace_dir.join(trace_id),
        TraceSetting::Path(path) => path.clone(),
    };

    match FileTracer::open(trace_id, &path) {
        Ok(tracer) => Some(Arc::new(tracer)),
        Err(e) => {
            tracing::warn!("Unable to enable tracer '{}': {:#}", trace_id, e);
            None
        }
    }
}

/// Copy of `value` with secret-looking fields masked
pub fn redact_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted: Map<String, Value> = map
                .iter()
                .map(|(key, v)| {
                    if SECRET_KEYS.iter().any(|s| s.eq_ignore_ascii_case(key)) {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), redact_secrets(v))
                    }
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_secrets).collect()),
        other => other.clone(),
    }
}
