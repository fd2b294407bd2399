pub mod report;

pub use report::{CategoryCount, ReportWriter, RunSummary};
