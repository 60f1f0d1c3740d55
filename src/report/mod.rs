//! Report assembly: presentation cells, named tables, the CSV sink and the
//! run summary.

pub mod catalogue;
pub mod sink;
pub mod summary;
pub mod table;

pub use sink::CsvSink;
pub use summary::{write_summary, FindingCounts, RunSummary, SummaryFormat};
pub use table::ReportTable;
