#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use webblast_tools::blast::{PollSettings, SearchParameters, SearchService, ServiceError, SubmitError};
use webblast_tools::SequenceRecord;

/// How the scripted service treats one query sequence.
#[derive(Clone, Debug)]
pub enum Script {
    /// `waits` WAITING responses, then the payload.
    Ready { waits: usize, payload: String },
    SubmitFails(SubmitError),
    RemoteFails,
    Expires,
    /// WAITING forever.
    Pending,
    /// Scripted status-query outcomes, then the payload.
    Errors { errors: Vec<ServiceError>, payload: String },
    PanicOnSubmit,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Submitted(String),
    Terminal(String),
}

type SubmitHook = Box<dyn Fn(usize) + Send + Sync>;

struct Job {
    query: String,
    fetches: usize,
}

/// In-memory stand-in for the remote service, keyed by query sequence.
pub struct ScriptedService {
    scripts: HashMap<String, Script>,
    default: Script,
    jobs: Mutex<HashMap<String, Job>>,
    events: Mutex<Vec<Event>>,
    submits: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    on_submit: Option<SubmitHook>,
}

impl ScriptedService {
    pub fn new(default: Script) -> Self {
        Self {
            scripts: HashMap::new(),
            default,
            jobs: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            submits: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            on_submit: None,
        }
    }

    pub fn with_script(mut self, query: &str, script: Script) -> Self {
        self.scripts.insert(query.to_string(), script);
        self
    }

    /// Called with the 0-based submit count before each submission returns.
    pub fn on_submit(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_submit = Some(Box::new(hook));
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn submitted_queries(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Submitted(q) => Some(q),
                Event::Terminal(_) => None,
            })
            .collect()
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn script(&self, query: &str) -> Script {
        self.scripts.get(query).cloned().unwrap_or_else(|| self.default.clone())
    }

    fn terminal(&self, query: &str) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event::Terminal(query.to_string()));
    }
}

impl SearchService for ScriptedService {
    fn submit(&self, query: &str, _params: &SearchParameters) -> Result<String, SubmitError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event::Submitted(query.to_string()));
        if let Some(hook) = &self.on_submit {
            hook(n);
        }

        match self.script(query) {
            Script::SubmitFails(e) => return Err(e),
            Script::PanicOnSubmit => panic!("scripted panic for {query}"),
            _ => {}
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let rid = format!("RID{n:04}");
        self.jobs.lock().unwrap().insert(
            rid.clone(),
            Job {
                query: query.to_string(),
                fetches: 0,
            },
        );
        Ok(rid)
    }

    fn fetch(&self, rid: &str) -> Result<String, ServiceError> {
        let (query, fetch) = {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(rid).expect("fetch for unknown rid");
            job.fetches += 1;
            (job.query.clone(), job.fetches)
        };

        let terminal = |body: String| {
            self.terminal(&query);
            Ok(body)
        };

        match self.script(&query) {
            Script::Ready { waits, payload } if fetch > waits => terminal(payload),
            Script::Ready { .. } | Script::Pending => Ok(waiting()),
            Script::RemoteFails => terminal("<p>Status=FAILED</p>".to_string()),
            Script::Expires => terminal("<p>Status=UNKNOWN</p>".to_string()),
            Script::Errors { errors, payload } => match errors.get(fetch - 1) {
                Some(ServiceError::Status(code)) if !ServiceError::Status(*code).is_transient() => {
                    self.terminal(&query);
                    Err(ServiceError::Status(*code))
                }
                Some(e) => Err(e.clone()),
                None => terminal(payload),
            },
            Script::SubmitFails(_) | Script::PanicOnSubmit => unreachable!("never submitted"),
        }
    }
}

pub fn waiting() -> String {
    "<html><!--QBlastInfoBegin\n    Status=WAITING\nQBlastInfoEnd--></html>".to_string()
}

/// A hit as it appears in the result payload.
pub struct PayloadHit<'a> {
    pub accession: &'a str,
    pub description: &'a str,
    pub evalue: f64,
    pub identity: u32,
    pub align_len: u32,
    pub bit_score: f64,
}

/// A BLAST XML document large enough to count as a complete payload.
pub fn payload(hits: &[PayloadHit]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\"?>\n<!DOCTYPE BlastOutput PUBLIC \"-//NCBI//NCBI BlastOutput/EN\" \"http://www.ncbi.nlm.nih.gov/dtd/NCBI_BlastOutput.dtd\">\n<BlastOutput>\n  <BlastOutput_program>blastp</BlastOutput_program>\n  <BlastOutput_db>nr</BlastOutput_db>\n",
    );
    xml.push_str(&format!("  <BlastOutput_query-def>{}</BlastOutput_query-def>\n", "x".repeat(900)));
    xml.push_str("  <BlastOutput_iterations><Iteration><Iteration_hits>\n");
    for (num, hit) in hits.iter().enumerate() {
        xml.push_str(&format!(
            "<Hit>\n  <Hit_num>{}</Hit_num>\n  <Hit_id>ref|{}|</Hit_id>\n  <Hit_def>{}</Hit_def>\n  <Hit_accession>{}</Hit_accession>\n  <Hit_len>300</Hit_len>\n  <Hit_hsps>\n    <Hsp>\n      <Hsp_bit-score>{}</Hsp_bit-score>\n      <Hsp_evalue>{:e}</Hsp_evalue>\n      <Hsp_identity>{}</Hsp_identity>\n      <Hsp_align-len>{}</Hsp_align-len>\n    </Hsp>\n  </Hit_hsps>\n</Hit>\n",
            num + 1,
            hit.accession,
            hit.description,
            hit.accession,
            hit.bit_score,
            hit.evalue,
            hit.identity,
            hit.align_len,
        ));
    }
    xml.push_str("</Iteration_hits></Iteration></BlastOutput_iterations>\n</BlastOutput>\n");
    xml
}

pub fn bacillus_hit() -> PayloadHit<'static> {
    PayloadHit {
        accession: "WP_003234567",
        description: "ABC transporter ATP-binding protein [Bacillus subtilis]",
        evalue: 1e-40,
        identity: 72,
        align_len: 90,
        bit_score: 160.0,
    }
}

pub fn mycoplasma_hit() -> PayloadHit<'static> {
    PayloadHit {
        accession: "WP_011234567",
        description: "ABC transporter [Mycoplasma pneumoniae]",
        evalue: 1e-60,
        identity: 90,
        align_len: 95,
        bit_score: 210.0,
    }
}

/// Query sequence of input `i`, 99 residues long.
pub fn query(i: usize) -> String {
    format!("{}{:03}", "MKVLAT".repeat(16), i)
}

pub fn records(n: usize) -> Vec<SequenceRecord> {
    (0..n)
        .map(|i| SequenceRecord::new(i, format!("AVN{i:05}"), format!("protein {i}"), query(i)))
        .collect()
}

pub fn fast_polling(max_attempts: u32) -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(2),
        backoff: Duration::ZERO,
        max_attempts,
        ..PollSettings::default()
    }
}
