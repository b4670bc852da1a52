//! JSONL form of allocator lifecycle records.
//!
//! Provides:
//! - [`LogRecord`]: serializable mirror of [`LifecycleRecord`].
//! - [`LogEmitter`]: writes JSONL lines to a file, stdout or a buffer.
//! - [`parse_log_line`]: reads one line back, checking required fields.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tinypool_core::LifecycleRecord;

/// Severity level, serialized lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tinypool_core::LogLevel> for LogLevel {
    fn from(level: tinypool_core::LogLevel) -> Self {
        match level {
            tinypool_core::LogLevel::Trace => Self::Trace,
            tinypool_core::LogLevel::Debug => Self::Debug,
            tinypool_core::LogLevel::Info => Self::Info,
            tinypool_core::LogLevel::Warn => Self::Warn,
            tinypool_core::LogLevel::Error => Self::Error,
        }
    }
}

/// One lifecycle record as written to JSONL.
///
/// Required fields: `decision_id`, `trace_id`, `level`, `symbol`, `event`,
/// `outcome`. Snapshot fields are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub decision_id: u64,
    pub trace_id: String,
    pub level: LogLevel,
    pub symbol: String,
    pub event: String,
    pub outcome: String,
    /// Hex address, e.g. `0x1000`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<usize>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    pub heap_size: usize,
    pub pool_remainder: usize,
    pub free_blocks: usize,
}

impl From<&LifecycleRecord> for LogRecord {
    fn from(record: &LifecycleRecord) -> Self {
        Self {
            decision_id: record.decision_id,
            trace_id: record.trace_id.clone(),
            level: record.level.into(),
            symbol: record.symbol.to_string(),
            event: record.event.to_string(),
            outcome: record.outcome.to_string(),
            addr: record.addr.map(|addr| format!("{addr:#x}")),
            size: record.size,
            class: record.class,
            details: record.details.clone(),
            heap_size: record.heap_size,
            pool_remainder: record.pool_remainder,
            free_blocks: record.free_blocks,
        }
    }
}

/// JSONL writer for lifecycle records.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    lines: u64,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(Box::new(std::io::BufWriter::new(file))))
    }

    /// Create an emitter that writes to stdout.
    #[must_use]
    pub fn to_stdout() -> Self {
        Self::to_writer(Box::new(std::io::stdout().lock()))
    }

    #[must_use]
    pub fn to_writer(writer: Box<dyn Write>) -> Self {
        Self { writer, lines: 0 }
    }

    /// Write one record as a JSON line.
    pub fn emit(&mut self, record: &LogRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        self.lines += 1;
        Ok(())
    }

    /// Write every record, in order.
    pub fn emit_all<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a LogRecord>,
    ) -> std::io::Result<()> {
        for record in records {
            self.emit(record)?;
        }
        Ok(())
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Parses one JSONL line, reporting the first problem found.
pub fn parse_log_line(line: &str, line_number: usize) -> Result<LogRecord, String> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| format!("line {line_number}: invalid JSON: {e}"))?;
    let Some(obj) = value.as_object() else {
        return Err(format!("line {line_number}: expected JSON object"));
    };
    for field in ["decision_id", "trace_id", "level", "symbol", "event", "outcome"] {
        if !obj.contains_key(field) {
            return Err(format!("line {line_number}: missing required field `{field}`"));
        }
    }
    let record: LogRecord = serde_json::from_value(value)
        .map_err(|e| format!("line {line_number}: schema mismatch: {e}"))?;
    if !record.trace_id.starts_with("tinypool::") {
        return Err(format!(
            "line {line_number}: trace_id `{}` lacks the tinypool:: prefix",
            record.trace_id
        ));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tinypool_core::{AllocatorConfig, PoolAllocator, SimulatedHeap};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sample_records() -> Vec<LogRecord> {
        let config = AllocatorConfig::default().with_logging();
        let mut pool = PoolAllocator::with_config(SimulatedHeap::new(), config);
        let p = pool.allocate(8).unwrap();
        pool.deallocate(p, 8).unwrap();
        pool.lifecycle_logs().map(LogRecord::from).collect()
    }

    #[test]
    fn records_convert_with_hex_addresses() {
        let records = sample_records();
        let grow = records.iter().find(|r| r.event == "pool_grow").unwrap();
        assert_eq!(grow.level, LogLevel::Info);
        assert!(grow.addr.as_deref().unwrap().starts_with("0x"));
        assert_eq!(grow.size, Some(320));
    }

    #[test]
    fn emitted_lines_parse_back() {
        let buf = SharedBuf::default();
        let mut emitter = LogEmitter::to_writer(Box::new(buf.clone()));
        let records = sample_records();
        emitter.emit_all(&records).unwrap();
        emitter.flush().unwrap();
        assert_eq!(emitter.lines(), records.len() as u64);

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let parsed: Vec<LogRecord> = text
            .lines()
            .enumerate()
            .map(|(i, line)| parse_log_line(line, i + 1).unwrap())
            .collect();
        assert_eq!(parsed, records);
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = parse_log_line(r#"{"decision_id":1,"trace_id":"tinypool::x::1"}"#, 3).unwrap_err();
        assert!(err.contains("line 3"));
        assert!(err.contains("level"));
        assert!(parse_log_line("not json", 1).unwrap_err().contains("invalid JSON"));
    }

    #[test]
    fn foreign_trace_ids_are_rejected() {
        let mut record = sample_records().remove(0);
        record.trace_id = "other::1".to_string();
        let line = serde_json::to_string(&record).unwrap();
        assert!(parse_log_line(&line, 1).unwrap_err().contains("prefix"));
    }
}
