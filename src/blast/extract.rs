use crate::types::Hit;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static HIT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<Hit>(.*?)</Hit>").expect("valid hit pattern"));
static HSP_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<Hsp>(.*?)</Hsp>").expect("valid hsp pattern"));

/// Client-side acceptance criteria for hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_evalue: f64,
    pub min_identity: f64,
    pub min_coverage: f64,
    /// Case-insensitive substrings; a hit whose description contains any of
    /// them is dropped regardless of what the service-side filter did.
    pub exclude_organisms: Vec<String>,
    pub max_hits: Option<usize>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_evalue: 0.01,
            min_identity: 30.0,
            min_coverage: 50.0,
            exclude_organisms: vec!["mycoplasma".to_string()],
            max_hits: Some(50),
        }
    }
}

impl FilterConfig {
    fn accepts(&self, hit: &Hit) -> bool {
        hit.evalue <= self.max_evalue
            && hit.identity_percent >= self.min_identity
            && hit.coverage_percent >= self.min_coverage
    }
}

/// Parses a BLAST XML payload into filtered hits, best (lowest E-value) first.
///
/// Only the first HSP of each hit block is considered. Blocks missing the
/// E-value, identity or alignment length are skipped without error.
pub fn extract(payload: &str, query_length: usize, filter: &FilterConfig) -> Vec<Hit> {
    let excluded: Vec<String> = filter
        .exclude_organisms
        .iter()
        .map(|o| o.trim().to_lowercase())
        .filter(|o| !o.is_empty())
        .collect();

    let mut hits: Vec<Hit> = HIT_BLOCK
        .captures_iter(payload)
        .filter_map(|c| c.get(1))
        .filter_map(|block| parse_hit(block.as_str(), query_length, &excluded))
        .filter(|hit| filter.accepts(hit))
        .collect();

    // Stable, so equal (evalue, bit score) pairs keep block order.
    hits.sort_by(|a, b| {
        a.evalue
            .total_cmp(&b.evalue)
            .then_with(|| b.bit_score.total_cmp(&a.bit_score))
    });

    if let Some(max) = filter.max_hits {
        hits.truncate(max);
    }
    hits
}

fn parse_hit(block: &str, query_length: usize, excluded: &[String]) -> Option<Hit> {
    let description = field(block, "Hit_def").map(decode_entities);
    if let Some(desc) = &description {
        let lowered = desc.to_lowercase();
        if excluded.iter().any(|org| lowered.contains(org.as_str())) {
            return None;
        }
    }

    let hsp = HSP_BLOCK.captures(block)?.get(1)?.as_str();

    let evalue: f64 = field(hsp, "Hsp_evalue")?.parse().ok()?;
    if !evalue.is_finite() || evalue < 0.0 {
        return None;
    }
    let identity: u32 = field(hsp, "Hsp_identity")?.parse().ok()?;
    let align_len: u32 = field(hsp, "Hsp_align-len")?.parse().ok()?;
    if align_len == 0 {
        return None;
    }

    let bit_score = field(hsp, "Hsp_bit-score")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);
    let subject_length = field(block, "Hit_len")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    let identity_percent = identity as f64 * 100.0 / align_len as f64;
    let coverage_percent = if query_length > 0 {
        align_len as f64 * 100.0 / query_length as f64
    } else {
        0.0
    };

    Some(Hit {
        accession: field(block, "Hit_accession")
            .map(decode_entities)
            .unwrap_or_else(|| "Unknown".to_string()),
        description: description.unwrap_or_else(|| "Unknown".to_string()),
        subject_length,
        evalue,
        identity,
        align_len,
        identity_percent,
        coverage_percent,
        bit_score,
    })
}

/// Text content of the first `<name>...</name>` element in `block`.
fn field<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    Some(block[start..end].trim())
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
