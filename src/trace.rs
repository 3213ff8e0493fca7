//! Per-row observability sink.
//!
//! A [`Tracer`] opens one [`RowTrace`] per requirement row; the agent
//! records [`TraceEvent`]s into it as nodes run. Tracing never influences
//! routing: the agent behaves identically with or without a tracer.
//!
//! | Sink | Output |
//! |------|--------|
//! | [`LogTracer`] | `tracing` events under target `rfp::trace` |
//! | [`JsonlTracer`] | one JSON object per line in a file |

use anyhow::{Context, Result};
use rfp_harness_core::models::{MatchPoint, Scope};
use rfp_harness_core::verdict::SufficiencyVerdict;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::{Arc, Mutex};

use crate::config::TraceConfig;

/// Identity of the row a trace belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct RowMeta {
    pub session_id: String,
    pub rfp_name: String,
    /// 1-based position in the batch.
    pub row_number: usize,
    pub scope: Scope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Retrieval {
        query: String,
        breadth: u32,
        matches: Vec<MatchPoint>,
        windows: usize,
    },
    Evaluation {
        /// `None` when the precheck routed without calling the model, or
        /// the model call failed.
        verdict: Option<SufficiencyVerdict>,
        retrieve_more: bool,
    },
    Generation {
        answer: String,
        fallback: bool,
    },
    Outcome {
        message: String,
    },
}

pub trait RowTrace: Send {
    fn record(&mut self, level: Level, event: TraceEvent);
}

pub trait Tracer: Send + Sync {
    fn start_row(&self, meta: RowMeta) -> Box<dyn RowTrace>;
    /// Flush buffered output. Called once per batch.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ============ Log sink ============

pub struct LogTracer;

struct LogRowTrace {
    meta: RowMeta,
}

impl Tracer for LogTracer {
    fn start_row(&self, meta: RowMeta) -> Box<dyn RowTrace> {
        Box::new(LogRowTrace { meta })
    }
}

impl RowTrace for LogRowTrace {
    fn record(&mut self, level: Level, event: TraceEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        let session = self.meta.session_id.as_str();
        let row = self.meta.row_number;
        match level {
            Level::Info => tracing::info!(target: "rfp::trace", session, row, "{}", payload),
            Level::Warning => tracing::warn!(target: "rfp::trace", session, row, "{}", payload),
            Level::Error => tracing::error!(target: "rfp::trace", session, row, "{}", payload),
        }
    }
}

// ============ JSONL sink ============

pub struct JsonlTracer {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlTracer {
    /// Append to `path`, creating it and its parent directory if needed.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open trace file: {}", path.display()))?;
        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }
}

#[derive(Serialize)]
struct JsonlLine<'a> {
    ts: String,
    #[serde(flatten)]
    meta: &'a RowMeta,
    level: Level,
    #[serde(flatten)]
    event: &'a TraceEvent,
}

struct JsonlRowTrace {
    meta: RowMeta,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl Tracer for JsonlTracer {
    fn start_row(&self, meta: RowMeta) -> Box<dyn RowTrace> {
        Box::new(JsonlRowTrace {
            meta,
            writer: self.writer.clone(),
        })
    }

    fn flush(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("trace writer poisoned"))?;
        writer.flush()?;
        Ok(())
    }
}

impl RowTrace for JsonlRowTrace {
    fn record(&mut self, level: Level, event: TraceEvent) {
        let line = JsonlLine {
            ts: chrono::Utc::now().to_rfc3339(),
            meta: &self.meta,
            level,
            event: &event,
        };
        let Ok(json) = serde_json::to_string(&line) else {
            return;
        };
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writeln!(writer, "{}", json) {
                tracing::warn!("failed to write trace line: {}", e);
            }
        }
    }
}

/// Build the sink named by `[trace] sink`. `none` yields no tracer.
pub fn create_tracer(config: &TraceConfig) -> Result<Option<Arc<dyn Tracer>>> {
    match config.sink.as_str() {
        "none" => Ok(None),
        "log" => Ok(Some(Arc::new(LogTracer))),
        "jsonl" => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("trace.path required for jsonl sink"))?;
            Ok(Some(Arc::new(JsonlTracer::open(path)?)))
        }
        other => anyhow::bail!("Unknown trace sink: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(row: usize) -> RowMeta {
        RowMeta {
            session_id: "q_p_2024-01-01_000000".into(),
            rfp_name: "q.csv".into(),
            row_number: row,
            scope: Scope::new(1, 2),
        }
    }

    #[test]
    fn jsonl_writes_one_line_per_event() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("traces/rows.jsonl");
        let tracer = JsonlTracer::open(&path).unwrap();

        let mut row = tracer.start_row(meta(1));
        row.record(
            Level::Info,
            TraceEvent::Generation {
                answer: "Yes.".into(),
                fallback: false,
            },
        );
        row.record(
            Level::Error,
            TraceEvent::Outcome {
                message: "boom".into(),
            },
        );
        tracer.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "generation");
        assert_eq!(lines[0]["row_number"], 1);
        assert_eq!(lines[0]["session_id"], "q_p_2024-01-01_000000");
        assert_eq!(lines[1]["level"], "error");
        assert_eq!(lines[1]["message"], "boom");
    }

    #[test]
    fn none_sink_builds_nothing() {
        let config = TraceConfig {
            sink: "none".into(),
            path: None,
        };
        assert!(create_tracer(&config).unwrap().is_none());
    }
}
