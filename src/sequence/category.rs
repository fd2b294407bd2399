use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse functional class of a protein, derived from its name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalCategory {
    DnaReplication,
    RnaProcessing,
    DnaRepair,
    ProteinSynthesis,
    CellDivision,
    Metabolism,
    Transport,
    Transcription,
    #[default]
    Unknown,
}

// First matching row wins, so the order matters: "ribosomal" lands in
// RnaProcessing before ProteinSynthesis is consulted.
const KEYWORDS: &[(FunctionalCategory, &[&str])] = &[
    (
        FunctionalCategory::DnaReplication,
        &["dnaa", "dna polymerase", "helicase", "primase", "topoisomerase"],
    ),
    (
        FunctionalCategory::RnaProcessing,
        &["rnmv", "ksga", "rrna", "trna", "ribosom"],
    ),
    (
        FunctionalCategory::DnaRepair,
        &["reca", "uvra", "uvrb", "uvrc", "muts", "mutl"],
    ),
    (
        FunctionalCategory::ProteinSynthesis,
        &["aminoacyl", "elongation factor", "release factor"],
    ),
    (
        FunctionalCategory::CellDivision,
        &["ftsz", "ftsa", "cell division", "septum"],
    ),
    (
        FunctionalCategory::Metabolism,
        &["kinase", "synthase", "dehydrogenase", "transferase", "hydrolase"],
    ),
    (
        FunctionalCategory::Transport,
        &["transporter", "permease", "abc", "channel", "pump"],
    ),
    (
        FunctionalCategory::Transcription,
        &["rna polymerase", "sigma factor", "transcription"],
    ),
];

impl FunctionalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionalCategory::DnaReplication => "dna_replication",
            FunctionalCategory::RnaProcessing => "rna_processing",
            FunctionalCategory::DnaRepair => "dna_repair",
            FunctionalCategory::ProteinSynthesis => "protein_synthesis",
            FunctionalCategory::CellDivision => "cell_division",
            FunctionalCategory::Metabolism => "metabolism",
            FunctionalCategory::Transport => "transport",
            FunctionalCategory::Transcription => "transcription",
            FunctionalCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FunctionalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive keyword match against a protein name.
pub fn classify(name: &str) -> FunctionalCategory {
    let name = name.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| name.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or_default()
}
