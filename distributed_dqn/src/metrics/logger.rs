//! Metrics loggers.
//!
//! Every component reports a flat `name -> value` map under its own label
//! (`"learner"`, `"actor"`, `"evaluator0"`, ...). Logging is fire-and-forget:
//! a failing backend drops the record and the caller never sees an error.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One metrics record.
pub type Metrics = BTreeMap<String, f64>;

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log one record under `label`.
    fn log(&mut self, label: &str, metrics: &Metrics);

    /// Flush any buffered output.
    fn flush(&mut self) {}
}

/// Time-throttled logger that emits through `log::info!`.
pub struct ConsoleLogger {
    time_delta: Duration,
    last_log: Option<Instant>,
}

impl ConsoleLogger {
    /// Create a new console logger emitting at most once per `time_delta`.
    pub fn new(time_delta: Duration) -> Self {
        Self {
            time_delta,
            last_log: None,
        }
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, label: &str, metrics: &Metrics) {
        let now = Instant::now();
        if let Some(last) = self.last_log {
            if now.duration_since(last) < self.time_delta {
                return;
            }
        }
        self.last_log = Some(now);

        let line = metrics
            .iter()
            .map(|(k, v)| format!("{} = {:.4}", k, v))
            .collect::<Vec<_>>()
            .join(" | ");
        log::info!("[{}] {}", label, line);
    }
}

/// CSV file logger. The header is fixed by the first record ever written to
/// the file, so a restarted component keeps appending under it.
pub struct CsvLogger {
    writer: BufWriter<File>,
    columns: Option<Vec<String>>,
}

impl CsvLogger {
    /// Open (or create) the CSV log at `path` for appending.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let columns = Self::read_header(&file)?;
        Ok(Self {
            writer: BufWriter::new(file),
            columns,
        })
    }

    /// Columns of an existing header line, `None` for an empty file.
    fn read_header(file: &File) -> std::io::Result<Option<Vec<String>>> {
        let mut header = String::new();
        BufReader::new(file).read_line(&mut header)?;
        let header = header.trim_end();
        if header.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            header
                .split(',')
                .skip(1)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    fn write_record(&mut self, label: &str, metrics: &Metrics) -> std::io::Result<()> {
        if self.columns.is_none() {
            let columns: Vec<String> = metrics.keys().cloned().collect();
            writeln!(self.writer, "label,{}", columns.join(","))?;
            self.columns = Some(columns);
        }

        let mut row = vec![label.to_string()];
        if let Some(columns) = &self.columns {
            // Keys absent from the header are dropped, missing ones left empty.
            row.extend(
                columns
                    .iter()
                    .map(|c| metrics.get(c).map(|v| v.to_string()).unwrap_or_default()),
            );
        }
        writeln!(self.writer, "{}", row.join(","))
    }
}

impl MetricsLogger for CsvLogger {
    fn log(&mut self, label: &str, metrics: &Metrics) {
        if let Err(e) = self.write_record(label, metrics) {
            log::warn!("[CsvLogger] dropped record for {}: {}", label, e);
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// In-memory sink. Clones share the same record list.
#[derive(Clone, Default)]
pub struct MemoryLogger {
    records: Arc<Mutex<Vec<(String, Metrics)>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record logged so far.
    pub fn records(&self) -> Vec<(String, Metrics)> {
        self.records.lock().clone()
    }

    /// Records logged under `label`.
    pub fn records_for(&self, label: &str) -> Vec<Metrics> {
        self.records
            .lock()
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricsLogger for MemoryLogger {
    fn log(&mut self, label: &str, metrics: &Metrics) {
        self.records.lock().push((label.to_string(), metrics.clone()));
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl MetricsLogger for NullLogger {
    fn log(&mut self, _label: &str, _metrics: &Metrics) {}
}

/// Multi-logger that writes to multiple backends.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    /// Create a new multi-logger.
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    /// Number of backends.
    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, label: &str, metrics: &Metrics) {
        for logger in &mut self.loggers {
            logger.log(label, metrics);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

/// Boxed logger handed to workers.
pub type BoxedLogger = Box<dyn MetricsLogger>;

/// Standard logger for one component: throttled console output, plus a
/// `{label}.csv` file when `csv_dir` is given.
pub fn make_default_logger(label: &str, time_delta: Duration, csv_dir: Option<&Path>) -> BoxedLogger {
    let mut logger = MultiLogger::new().add(ConsoleLogger::new(time_delta));
    if let Some(dir) = csv_dir {
        match CsvLogger::new(dir.join(format!("{}.csv", label))) {
            Ok(csv) => logger = logger.add(csv),
            Err(e) => log::warn!("[{}] CSV logging disabled: {}", label, e),
        }
    }
    Box::new(logger)
}

/// Build a `Metrics` map from `(name, value)` pairs.
pub fn metrics<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Metrics {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_logger_shares_records() {
        let logger = MemoryLogger::new();
        let mut sink = logger.clone();

        sink.log("actor", &metrics([("steps", 10.0)]));
        sink.log("learner", &metrics([("loss", 0.5)]));

        assert_eq!(logger.len(), 2);
        assert_eq!(logger.records_for("actor"), vec![metrics([("steps", 10.0)])]);
    }

    #[test]
    fn test_csv_logger_header_from_first_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("learner.csv");
        {
            let mut logger = CsvLogger::new(&path).unwrap();
            logger.log("learner", &metrics([("steps", 1.0), ("loss", 0.5)]));
            logger.log("learner", &metrics([("steps", 2.0), ("extra", 9.0)]));
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["label,loss,steps", "learner,0.5,1", "learner,,2"]);
    }

    #[test]
    fn test_csv_logger_appends_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("actor.csv");
        {
            let mut logger = CsvLogger::new(&path).unwrap();
            logger.log("actor", &metrics([("steps", 1.0), ("episodes", 0.0)]));
        }
        {
            // Restarted component: same file, keys in a different set.
            let mut logger = CsvLogger::new(&path).unwrap();
            logger.log("actor", &metrics([("steps", 7.0), ("loss", 2.0)]));
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec!["label,episodes,steps", "actor,0,1", "actor,,7"]
        );
    }

    #[test]
    fn test_csv_logger_empty_file_gets_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("learner.csv");
        std::fs::write(&path, "").unwrap();

        {
            let mut logger = CsvLogger::new(&path).unwrap();
            logger.log("learner", &metrics([("loss", 0.25)]));
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec!["label,loss", "learner,0.25"]);
    }

    #[test]
    fn test_console_logger_throttles() {
        let mut logger = ConsoleLogger::new(Duration::from_secs(3600));
        logger.log("actor", &metrics([("steps", 1.0)]));
        let first = logger.last_log;
        logger.log("actor", &metrics([("steps", 2.0)]));
        assert_eq!(logger.last_log, first);
    }

    #[test]
    fn test_multi_logger_fans_out() {
        let a = MemoryLogger::new();
        let b = MemoryLogger::new();
        let mut multi = MultiLogger::new().add(a.clone()).add(b.clone()).add(NullLogger);

        multi.log("evaluator0", &metrics([("episode_return", 3.0)]));
        multi.flush();

        assert_eq!(multi.len(), 3);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_make_default_logger_with_csv() {
        let dir = tempdir().unwrap();
        let mut logger = make_default_logger("actor", Duration::from_secs(1), Some(dir.path()));
        logger.log("actor", &metrics([("steps", 1.0)]));
        logger.flush();
        assert!(dir.path().join("actor.csv").exists());
    }
}
