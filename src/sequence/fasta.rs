use crate::error::{PipelineError, PipelineResult};
use crate::types::SequenceRecord;
use bio::io::fasta;
use niffler::get_reader;
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

static PROTEIN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[protein_id=([^\]]+)\]").expect("valid protein_id pattern"));
static PROTEIN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[protein=([^\]]+)\]").expect("valid protein pattern"));
static LOCUS_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[locus_tag=([^\]]+)\]").expect("valid locus_tag pattern"));

const UNNAMED: &str = "hypothetical protein";

pub struct FastaSource {
    path: PathBuf,
    reader: fasta::Reader<BufReader<Box<dyn Read>>>,
}

impl FastaSource {
    pub fn open(path: &Path) -> PipelineResult<Self> {
        let file = File::open(path).map_err(|e| PipelineError::input(path, e))?;
        let (inner_reader, _compression) =
            get_reader(Box::new(file)).map_err(|e| PipelineError::input(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: fasta::Reader::with_capacity(1024 * 1024, inner_reader),
        })
    }

    /// Reads every record in file order. Records with an empty sequence body
    /// are dropped; indices are assigned to the records that remain.
    pub fn read_all(self) -> PipelineResult<Vec<SequenceRecord>> {
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for result in self.reader.records() {
            let record = result.map_err(|e| PipelineError::input(&self.path, e))?;
            let sequence: String = String::from_utf8_lossy(record.seq())
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();

            if sequence.is_empty() {
                debug!(id = record.id(), "Skipping record with empty sequence");
                skipped += 1;
                continue;
            }

            let header = header_fields(record.id(), record.desc());
            records.push(
                SequenceRecord::new(records.len(), header.id, header.name, sequence)
                    .with_locus_tag(header.locus_tag),
            );
        }

        info!(
            path = %self.path.display(),
            records = records.len(),
            skipped,
            "Loaded sequences"
        );
        Ok(records)
    }
}

/// `parse(path)`: ordered records from a (possibly compressed) FASTA file.
pub fn parse(path: &Path) -> PipelineResult<Vec<SequenceRecord>> {
    FastaSource::open(path)?.read_all()
}

#[derive(Debug, PartialEq)]
struct HeaderFields {
    id: String,
    name: String,
    locus_tag: Option<String>,
}

/// Pulls the identifier, display name and locus tag out of an NCBI-style
/// header such as `lcl|NC_000908.2_prot_1 [locus_tag=X_0001] [protein=DnaA] [protein_id=AVN01]`.
fn header_fields(id: &str, desc: Option<&str>) -> HeaderFields {
    let desc = desc.unwrap_or("");

    let identifier = PROTEIN_ID
        .captures(desc)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| id.to_string());

    let name = match PROTEIN_NAME.captures(desc) {
        Some(c) => c[1].trim().to_string(),
        None if !desc.trim().is_empty() && !desc.contains('[') => desc.trim().to_string(),
        None => UNNAMED.to_string(),
    };

    let locus_tag = LOCUS_TAG.captures(desc).map(|c| c[1].trim().to_string());

    HeaderFields {
        id: identifier,
        name,
        locus_tag,
    }
}
