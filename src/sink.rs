//! Append-only text sinks for the evaluator log and the curve report
//!
//! Both sinks are generic over `Write` so tests can capture output in memory.
//! File-backed sinks own a `BufWriter<File>`; the handle is closed when the
//! sink is dropped, whichever way the run ends. `finish` flushes explicitly and
//! surfaces the flush error instead of losing it in `Drop`.

use crate::Result;
use chrono::{SecondsFormat, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header of the bulk insert statement
pub const REPORT_PROLOGUE: &str =
    "INSERT INTO `tmp_curve`(`task_id`,`interval_start`,`score`,`baseline`,`max`) VALUES \n";

/// Timestamped evaluator log
#[derive(Debug)]
pub struct LogSink<W: Write> {
    writer: W,
}

impl LogSink<BufWriter<File>> {
    /// Create (truncate) a log file
    ///
    /// # Errors
    /// Returns error if the file cannot be created
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> LogSink<W> {
    /// Wrap a writer
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Append one `[timestamp] [status] message` line
    ///
    /// # Errors
    /// Returns error if writing fails
    pub fn line(&mut self, status: &str, message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        writeln!(self.writer, "[{now}] [{status}] {message}")?;
        Ok(())
    }

    /// Append a multi-line block verbatim
    ///
    /// # Errors
    /// Returns error if writing fails
    pub fn block(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flush and hand back the writer
    ///
    /// # Errors
    /// Returns error if flushing fails
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Bulk-insert curve report
///
/// The prologue is written before the first tuple; tuples are separated by
/// `,\n` and `finish` closes the statement with `;`. A report without tuples
/// stays empty.
#[derive(Debug)]
pub struct ReportSink<W: Write> {
    writer: W,
    tuples: usize,
}

impl ReportSink<BufWriter<File>> {
    /// Create (truncate) a report file
    ///
    /// # Errors
    /// Returns error if the file cannot be created
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> ReportSink<W> {
    /// Wrap a writer
    pub const fn new(writer: W) -> Self {
        Self { writer, tuples: 0 }
    }

    /// Number of tuples written so far
    #[must_use]
    pub const fn tuples_written(&self) -> usize {
        self.tuples
    }

    /// Append tuples
    ///
    /// # Errors
    /// Returns error if writing fails
    pub fn write_tuples<S: AsRef<str>>(&mut self, tuples: &[S]) -> Result<()> {
        for tuple in tuples {
            if self.tuples == 0 {
                self.writer.write_all(REPORT_PROLOGUE.as_bytes())?;
            } else {
                self.writer.write_all(b",\n")?;
            }
            self.writer.write_all(tuple.as_ref().as_bytes())?;
            self.tuples += 1;
        }
        Ok(())
    }

    /// Terminate the statement, flush and hand back the writer
    ///
    /// # Errors
    /// Returns error if writing or flushing fails
    pub fn finish(mut self) -> Result<W> {
        if self.tuples > 0 {
            self.writer.write_all(b";\n")?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_lines_are_timestamped() {
        let mut log = LogSink::new(Vec::new());
        log.line("OK", "Running task 1").unwrap();
        log.block("summary").unwrap();
        let text = String::from_utf8(log.finish().unwrap()).unwrap();
        let first = text.lines().next().unwrap();
        assert!(first.starts_with('['));
        assert!(first.ends_with("[OK] Running task 1"));
        assert!(text.ends_with("summary\n"));
    }

    #[test]
    fn test_report_prologue_once_and_terminated() {
        let mut report = ReportSink::new(Vec::new());
        report.write_tuples(&["(1,0,0.9,0.1,0.9)"]).unwrap();
        report.write_tuples(&["(2,0,0.5,0.5,0.5)", "(2,1,0.4,0.4,0.4)"]).unwrap();
        assert_eq!(report.tuples_written(), 3);
        let text = String::from_utf8(report.finish().unwrap()).unwrap();
        assert_eq!(text.matches("INSERT INTO").count(), 1);
        assert!(text.starts_with(REPORT_PROLOGUE));
        assert!(text.ends_with("(2,1,0.4,0.4,0.4);\n"));
        assert!(text.contains("(1,0,0.9,0.1,0.9),\n(2,0,0.5,0.5,0.5)"));
    }

    #[test]
    fn test_empty_report_writes_nothing() {
        let mut report = ReportSink::new(Vec::new());
        report.write_tuples::<&str>(&[]).unwrap();
        assert!(report.finish().unwrap().is_empty());
    }
}
