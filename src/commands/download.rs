use crate::utils::progress_bar_builder::ProgressBarBuilder;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::info;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";

pub const DEFAULT_TERM: &str = "Mesoplasma florum JCVI-syn3A[Organism]";
pub const DEFAULT_RETMAX: usize = 500;

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
}

/// Downloads every protein matching `term` (up to `retmax`) as FASTA.
pub fn run(output: PathBuf, term: String, retmax: usize) -> Result<()> {
    let progress = ProgressBarBuilder::new(format!("Searching NCBI protein for '{term}'..."))
        .with_tick(Duration::from_millis(120))
        .build()?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .user_agent(concat!("webblast-tools/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let retmax = retmax.to_string();
    let search: EsearchResponse = client
        .get(format!("{EUTILS_BASE}esearch.fcgi"))
        .query(&[
            ("db", "protein"),
            ("term", term.as_str()),
            ("retmode", "json"),
            ("retmax", retmax.as_str()),
        ])
        .send()
        .and_then(|r| r.error_for_status())
        .context("esearch request failed")?
        .json()
        .context("Unexpected esearch response")?;

    let ids = search.esearchresult.idlist;
    info!(
        term = %term,
        matches = search.esearchresult.count.as_deref().unwrap_or("?"),
        fetched = ids.len(),
        "esearch finished"
    );
    if ids.is_empty() {
        progress.finish_and_clear();
        bail!("No proteins found for '{}'", term);
    }

    progress.set_message(format!("Fetching {} protein sequences...", ids.len()));
    let id_list = ids.join(",");
    let fasta = client
        .get(format!("{EUTILS_BASE}efetch.fcgi"))
        .query(&[
            ("db", "protein"),
            ("id", id_list.as_str()),
            ("rettype", "fasta"),
            ("retmode", "text"),
        ])
        .send()
        .and_then(|r| r.error_for_status())
        .context("efetch request failed")?
        .text()?;

    let records = count_records(&fasta);
    if records == 0 {
        progress.finish_and_clear();
        bail!("efetch returned no FASTA records");
    }

    write_atomically(&output, fasta.as_bytes())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    progress.finish_with_message(format!("Downloaded {} proteins to {}", records, output.display()));
    Ok(())
}

fn count_records(fasta: &str) -> usize {
    fasta.lines().filter(|line| line.starts_with('>')).count()
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
