//! Per-(provider, model) log files
//!
//! Events emitted inside a `run` span are appended to
//! `<logs_dir>/<provider>_<model>.log`. Each file is truncated the first
//! time it is written in a process, so it holds the latest sweep only.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Name of the span that scopes one benchmark run
pub const RUN_SPAN: &str = "run";

/// File name for a (provider, model); path separators and colons become `_`
pub fn log_file_name(provider: &str, model: &str) -> String {
    let clean = |s: &str| s.replace(['/', '\\', ':'], "_");
    format!("{}_{}.log", clean(provider), clean(model))
}

/// Stored in the extensions of a run span
struct RunLogTarget(String);

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push((field.name(), format!("{:?}", value)));
        }
    }
}

impl FieldCollector {
    fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Tracing layer that splits run events into one file per model
pub struct RunLogLayer {
    dir: PathBuf,
    files: Mutex<HashMap<String, File>>,
}

impl RunLogLayer {
    /// Create the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_line(&self, file_name: &str, line: &str) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if !files.contains_key(file_name) {
            match File::create(self.dir.join(file_name)) {
                Ok(file) => {
                    files.insert(file_name.to_string(), file);
                }
                // Logging must never take the run down
                Err(e) => {
                    eprintln!("reasonbench: cannot open log {}: {}", file_name, e);
                    return;
                }
            }
        }
        if let Some(file) = files.get_mut(file_name) {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

impl<S> Layer<S> for RunLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != RUN_SPAN {
            return;
        }
        let mut collector = FieldCollector::default();
        attrs.record(&mut collector);

        if let (Some(provider), Some(model)) = (collector.get("provider"), collector.get("model")) {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut()
                    .insert(RunLogTarget(log_file_name(provider, model)));
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        let Some(file_name) = scope
            .into_iter()
            .find_map(|span| span.extensions().get::<RunLogTarget>().map(|t| t.0.clone()))
        else {
            return;
        };

        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let metadata = event.metadata();
        let mut line = format!(
            "{} - {} - {} - {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            metadata.target(),
            metadata.level(),
            collector.message
        );
        for (key, value) in &collector.fields {
            let _ = write!(line, " {}={}", key, value);
        }
        line.push('\n');

        self.write_line(&file_name, &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_log_file_name_is_path_safe() {
        assert_eq!(log_file_name("ollama", "llama3.1:8b"), "ollama_llama3.1_8b.log");
        assert_eq!(log_file_name("openrouter", "meta/llama"), "openrouter_meta_llama.log");
    }

    #[test]
    fn test_run_events_land_in_their_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let layer = RunLogLayer::new(dir.path().join("logs")).unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("outside any run");
            for (provider, model) in [("local", "m:1"), ("remote", "org/m2")] {
                let span = tracing::info_span!(RUN_SPAN, prompt = "cubes", provider = %provider, model = %model);
                let _guard = span.enter();
                let node = tracing::debug_span!("node", name = "solve");
                let _node = node.enter();
                tracing::warn!(attempt = 2, "answer for {}", provider);
            }
        });

        let local = std::fs::read_to_string(dir.path().join("logs/local_m_1.log")).unwrap();
        assert!(local.contains("WARN"));
        assert!(local.contains("answer for local attempt=2"));
        assert!(!local.contains("remote"));
        assert!(!local.contains("outside any run"));

        let remote = std::fs::read_to_string(dir.path().join("logs/remote_org_m2.log")).unwrap();
        assert!(remote.contains("answer for remote"));
    }
}
