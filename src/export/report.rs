use crate::blast::FilterConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::RunOutcome;
use crate::sequence::FunctionalCategory;
use crate::types::{AnalysisResult, Hit, JobStatus};
use crate::utils::safe_file_name;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RESULTS_FILE: &str = "blast_results.csv";
pub const SUMMARY_FILE: &str = "blast_summary.json";
pub const HITS_DIR: &str = "hits";

/// Aggregate statistics over the final result list of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub analysis_date: DateTime<Local>,
    pub total_sequences: usize,
    pub status_counts: BTreeMap<JobStatus, usize>,
    pub category_counts: BTreeMap<FunctionalCategory, CategoryCount>,
    pub successful: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub with_hits: usize,
    pub without_hits: usize,
    /// Successful jobs as a percentage of jobs that reached a terminal state.
    pub success_rate: f64,
    /// Jobs with hits as a percentage of successful jobs.
    pub homolog_rate: f64,
    pub elapsed_hours: f64,
    pub rate_per_hour: f64,
    pub timed_out: bool,
    pub interrupted: bool,
    pub filter: FilterConfig,
}

/// Proteins in one functional category, and how many of them found homologs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryCount {
    pub count: usize,
    pub with_hits: usize,
}

impl RunSummary {
    pub fn from_results(results: &[AnalysisResult], outcome: &RunOutcome, filter: &FilterConfig) -> Self {
        let mut status_counts: BTreeMap<JobStatus, usize> =
            JobStatus::ALL.iter().map(|status| (*status, 0)).collect();
        for result in results {
            *status_counts.entry(result.status).or_insert(0) += 1;
        }

        let count = |status: JobStatus| status_counts.get(&status).copied().unwrap_or(0);
        let successful = count(JobStatus::Success);
        let not_attempted = count(JobStatus::NotAttempted);
        let finished = results.len() - not_attempted;
        let with_hits = results
            .iter()
            .filter(|r| r.status == JobStatus::Success && r.has_hits())
            .count();

        let mut category_counts: BTreeMap<FunctionalCategory, CategoryCount> = BTreeMap::new();
        for result in results {
            let entry = category_counts.entry(result.category).or_default();
            entry.count += 1;
            if result.status == JobStatus::Success && result.has_hits() {
                entry.with_hits += 1;
            }
        }

        let elapsed_hours = outcome.elapsed.as_secs_f64() / 3600.0;
        let rate_per_hour = if elapsed_hours > 0.0 {
            outcome.completed as f64 / elapsed_hours
        } else {
            0.0
        };

        Self {
            analysis_date: Local::now(),
            total_sequences: results.len(),
            successful,
            failed: finished - successful,
            not_attempted,
            with_hits,
            without_hits: successful - with_hits,
            success_rate: percent(successful, finished),
            homolog_rate: percent(with_hits, successful),
            elapsed_hours,
            rate_per_hour,
            timed_out: outcome.timed_out,
            interrupted: outcome.interrupted,
            filter: filter.clone(),
            status_counts,
            category_counts,
        }
    }

    pub fn print(&self) {
        println!("\nRun summary");
        println!("  Sequences:        {}", self.total_sequences);
        println!("  Successful:       {} ({:.1}%)", self.successful, self.success_rate);
        println!("  With hits:        {} ({:.1}%)", self.with_hits, self.homolog_rate);
        println!("  Failed:           {}", self.failed);
        for (status, count) in &self.status_counts {
            if status.is_failure() && *count > 0 {
                println!("    {:<16}{}", status.as_str(), count);
            }
        }
        if self.not_attempted > 0 {
            println!("  Not attempted:    {}", self.not_attempted);
        }
        println!("  By category:");
        for (category, counts) in &self.category_counts {
            println!("    {:<18}{} ({} with hits)", category.as_str(), counts.count, counts.with_hits);
        }
        println!("  Elapsed:          {:.2} h ({:.1} per hour)", self.elapsed_hours, self.rate_per_hour);
        if self.timed_out {
            println!("  Stopped by the run timeout; rerun to resume.");
        } else if self.interrupted {
            println!("  Stopped on request; rerun to resume.");
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// One row of `blast_results.csv`.
#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    index: usize,
    id: &'a str,
    name: &'a str,
    locus_tag: Option<&'a str>,
    category: FunctionalCategory,
    sequence_length: usize,
    rid: Option<&'a str>,
    status: JobStatus,
    hit_count: usize,
    has_hits: bool,
    best_hit_accession: Option<&'a str>,
    best_hit_evalue: Option<f64>,
    best_hit_identity: Option<f64>,
    best_hit_coverage: Option<f64>,
    best_hit_description: Option<&'a str>,
    detail: Option<&'a str>,
    completed_at: String,
}

impl<'a> From<&'a AnalysisResult> for ResultRow<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        let best = result.best_hit.as_ref();
        Self {
            index: result.index,
            id: &result.id,
            name: &result.name,
            locus_tag: result.locus_tag.as_deref(),
            category: result.category,
            sequence_length: result.sequence_length,
            rid: result.rid.as_deref(),
            status: result.status,
            hit_count: result.hit_count,
            has_hits: result.has_hits(),
            best_hit_accession: best.map(|h| h.accession.as_str()),
            best_hit_evalue: best.map(|h| h.evalue),
            best_hit_identity: best.map(|h| h.identity_percent),
            best_hit_coverage: best.map(|h| h.coverage_percent),
            best_hit_description: best.map(|h| h.description.as_str()),
            detail: result.detail.as_deref(),
            completed_at: result.completed_at.to_rfc3339(),
        }
    }
}

/// Writes the end-of-run reports under one results directory.
pub struct ReportWriter {
    results_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// One row per result, ordered by input index.
    pub fn write_results(&self, results: &[AnalysisResult]) -> PipelineResult<PathBuf> {
        let path = self.prepare(RESULTS_FILE)?;
        let mut ordered: Vec<&AnalysisResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.index);

        let mut writer = csv::Writer::from_path(&path)?;
        for result in ordered {
            writer.serialize(ResultRow::from(result))?;
        }
        writer.flush().map_err(report_error)?;

        info!(path = %path.display(), rows = results.len(), "Wrote results table");
        Ok(path)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> PipelineResult<PathBuf> {
        let path = self.prepare(SUMMARY_FILE)?;
        let file = File::create(&path).map_err(report_error)?;
        serde_json::to_writer_pretty(BufWriter::new(file), summary)?;

        info!(path = %path.display(), "Wrote run summary");
        Ok(path)
    }

    /// Writes `hits/<id>_hits.csv` for every successful result that kept hits.
    /// Returns the number of tables written.
    pub fn write_hit_tables(&self, results: &[AnalysisResult]) -> PipelineResult<usize> {
        let dir = self.results_dir.join(HITS_DIR);
        let mut written = 0;

        for result in results.iter().filter(|r| r.status == JobStatus::Success && !r.hits.is_empty()) {
            fs::create_dir_all(&dir).map_err(report_error)?;
            let path = dir.join(format!("{}_hits.csv", safe_file_name(&result.id)));
            write_hits(&path, &result.hits)?;
            written += 1;
        }

        if written > 0 {
            info!(dir = %dir.display(), tables = written, "Wrote hit tables");
        }
        Ok(written)
    }

    fn prepare(&self, file_name: &str) -> PipelineResult<PathBuf> {
        fs::create_dir_all(&self.results_dir).map_err(report_error)?;
        Ok(self.results_dir.join(file_name))
    }
}

fn write_hits(path: &Path, hits: &[Hit]) -> PipelineResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for hit in hits {
        writer.serialize(hit)?;
    }
    writer.flush().map_err(report_error)?;
    Ok(())
}

fn report_error(err: std::io::Error) -> PipelineError {
    PipelineError::Report(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SequenceRecord;
    use std::time::Duration;

    fn hit(accession: &str) -> Hit {
        Hit {
            accession: accession.to_string(),
            description: "ABC transporter, ATP-binding protein [Bacillus subtilis]".to_string(),
            subject_length: 300,
            evalue: 1e-40,
            identity: 80,
            align_len: 100,
            identity_percent: 80.0,
            coverage_percent: 100.0,
            bit_score: 150.0,
        }
    }

    fn sample_results() -> Vec<AnalysisResult> {
        let record = |i: usize| {
            SequenceRecord::new(i, format!("AVN0{i}"), "ABC transporter permease", "MKVLAT")
                .with_locus_tag(Some(format!("JCVISYN3A_000{i}")))
        };
        vec![
            AnalysisResult::success(&record(2), "RID2", Vec::new(), None),
            AnalysisResult::success(&record(0), "RID0", vec![hit("WP_1"), hit("WP_2")], None),
            AnalysisResult::failed(&record(1), Some("RID1"), JobStatus::Expired, "handle expired or unknown"),
            AnalysisResult::not_attempted(&record(3), "run stopped before submission"),
        ]
    }

    #[test]
    fn test_summary_counts() {
        let outcome = RunOutcome {
            pending: 4,
            completed: 3,
            not_attempted: 1,
            elapsed: Duration::from_secs(1800),
            ..RunOutcome::default()
        };
        let summary = RunSummary::from_results(&sample_results(), &outcome, &FilterConfig::default());

        assert_eq!(summary.total_sequences, 4);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.not_attempted, 1);
        assert_eq!(summary.with_hits, 1);
        assert_eq!(summary.without_hits, 1);
        assert!((summary.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.homolog_rate, 50.0);
        assert_eq!(summary.rate_per_hour, 6.0);
        assert_eq!(summary.status_counts[&JobStatus::Expired], 1);
        assert_eq!(summary.status_counts[&JobStatus::TimedOut], 0);
        assert_eq!(
            summary.category_counts[&FunctionalCategory::Transport],
            CategoryCount { count: 4, with_hits: 1 }
        );
    }

    #[test]
    fn test_category_counts_split_by_name() {
        let dnaa = SequenceRecord::new(0, "AVN01", "chromosomal replication initiator protein DnaA", "MKV");
        let unknown = SequenceRecord::new(1, "AVN02", "hypothetical protein", "MKV");
        let results = vec![
            AnalysisResult::success(&dnaa, "RID0", vec![hit("WP_1")], None),
            AnalysisResult::success(&unknown, "RID1", Vec::new(), None),
            AnalysisResult::not_attempted(&unknown, "run interrupted"),
        ];

        let summary = RunSummary::from_results(&results, &RunOutcome::default(), &FilterConfig::default());

        assert_eq!(summary.category_counts.len(), 2);
        assert_eq!(
            summary.category_counts[&FunctionalCategory::DnaReplication],
            CategoryCount { count: 1, with_hits: 1 }
        );
        assert_eq!(
            summary.category_counts[&FunctionalCategory::Unknown],
            CategoryCount { count: 2, with_hits: 0 }
        );
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = RunSummary::from_results(&[], &RunOutcome::default(), &FilterConfig::default());
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.homolog_rate, 0.0);
        assert_eq!(summary.rate_per_hour, 0.0);
    }

    #[test]
    fn test_reports_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("results"));
        let results = sample_results();

        let table = writer.write_results(&results).unwrap();
        let mut reader = csv::Reader::from_path(&table).unwrap();
        let headers = reader.headers().unwrap().clone();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        let column = |name: &str| headers.iter().position(|h| h == name).unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][column("id")], "AVN00");
        assert_eq!(&rows[0][column("best_hit_accession")], "WP_1");
        assert_eq!(&rows[0][column("locus_tag")], "JCVISYN3A_0000");
        assert_eq!(&rows[0][column("category")], "transport");
        assert_eq!(&rows[1][column("status")], "expired");
        assert_eq!(&rows[3][column("status")], "not_attempted");

        let summary = RunSummary::from_results(&results, &RunOutcome::default(), &FilterConfig::default());
        let path = writer.write_summary(&summary).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["successful"], 2);
        assert_eq!(json["status_counts"]["submit_failed"], 0);
        assert_eq!(json["filter"]["exclude_organisms"][0], "mycoplasma");
        assert_eq!(json["category_counts"]["transport"]["count"], 4);
        assert_eq!(json["category_counts"]["transport"]["with_hits"], 1);
    }

    #[test]
    fn test_hit_tables_only_for_hits() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());

        assert_eq!(writer.write_hit_tables(&sample_results()).unwrap(), 1);

        let table = dir.path().join(HITS_DIR).join("AVN00_hits.csv");
        let mut reader = csv::Reader::from_path(table).unwrap();
        assert_eq!(reader.records().count(), 2);
    }
}
