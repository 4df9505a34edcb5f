//! Scalar Metrics Sink
//!
//! Writes `(tag, step, value)` scalar rows to a CSV file under the run root
//! so that pool growth, precision and loss curves can be plotted later.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::utils::error::Result;

/// Sink for scalar training/evaluation metrics
pub trait MetricsSink {
    /// Record one scalar value for a tag at a global step
    fn write_scalar(&mut self, tag: &str, step: usize, value: f64) -> Result<()>;
}

/// CSV-backed scalar writer, one row per recorded value
pub struct ScalarWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ScalarWriter {
    /// Create a writer at the given path, truncating any previous run's file
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "tag,step,value")?;
        writer.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    /// Path of the underlying CSV file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for ScalarWriter {
    fn write_scalar(&mut self, tag: &str, step: usize, value: f64) -> Result<()> {
        writeln!(self.writer, "{},{},{}", tag, step, value)?;
        self.writer.flush()?;
        Ok(())
    }
}
