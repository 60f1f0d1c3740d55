//! CSV output with date-stamped file names.

use crate::error::AnalysisResult;
use crate::report::table::ReportTable;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes report tables as `<dir>/<name>_<YYYYMMDD>.csv`.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
    stamp: String,
}

impl CsvSink {
    /// Create the sink, making sure the output directory exists.
    pub fn new(dir: impl Into<PathBuf>, date: NaiveDate) -> AnalysisResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            stamp: date_stamp(date),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    /// Stamped path for an artefact with the given stem and extension.
    pub fn path_for(&self, name: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.{}", name, self.stamp, extension))
    }

    /// Write one table. A table without rows still gets its header line.
    pub fn write(&self, table: &ReportTable) -> AnalysisResult<PathBuf> {
        let path = self.path_for(&table.name, "csv");
        let mut writer = csv::Writer::from_path(&path)?;

        writer.write_record(&table.headers)?;
        for row in table.rendered_rows() {
            writer.write_record(&row)?;
        }
        writer.flush()?;

        debug!("Wrote {} rows to {}", table.len(), path.display());
        Ok(path)
    }
}

/// `YYYYMMDD` form of a date.
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::table::Cell;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_file_name_is_stamped() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path(), date()).unwrap();

        assert_eq!(sink.stamp(), "20240309");
        assert_eq!(
            sink.path_for("kpi_category", "csv"),
            dir.path().join("kpi_category_20240309.csv")
        );
    }

    #[test]
    fn test_write_rows() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path().join("nested"), date()).unwrap();

        let mut table = ReportTable::new("demo", ["category", "fraud_rate"]);
        table.push(vec![Cell::text("es_food"), Cell::Decimal(100.0 / 3.0)]);
        table.push(vec![Cell::text("es_travel, abroad"), Cell::Empty]);

        let path = sink.write(&table).unwrap();
        let content = std::fs::read_to_string(path).unwrap();

        assert_eq!(
            content,
            "category,fraud_rate\nes_food,33.33\n\"es_travel, abroad\",\n"
        );
    }

    #[test]
    fn test_zero_row_table_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path(), date()).unwrap();

        let table = ReportTable::new("empty", ["step", "fraud_rate"]);
        let path = sink.write(&table).unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "step,fraud_rate\n");
    }
}
