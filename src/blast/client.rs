use super::{SearchParameters, SearchService, ServiceError, SubmitError, RESULT_FORMAT};
use crate::config::ServiceConfig;
use regex::Regex;
use reqwest::blocking::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

static RID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"RID = (\w+)").expect("valid RID pattern"));

/// HTTP client for the NCBI BLAST URL API (`Blast.cgi`).
pub struct BlastClient {
    client: Client,
    base_url: String,
    submit_timeout: Duration,
    poll_timeout: Duration,
}

impl BlastClient {
    pub fn new(config: &ServiceConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            submit_timeout: Duration::from_secs(config.submit_timeout_secs),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
        })
    }
}

impl SearchService for BlastClient {
    fn submit(&self, query: &str, params: &SearchParameters) -> Result<String, SubmitError> {
        if query.is_empty() {
            return Err(SubmitError::EmptyQuery);
        }

        let response = self
            .client
            .post(&self.base_url)
            .timeout(self.submit_timeout)
            .form(&params.form_fields(query))
            .send()
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "BLAST submission rejected");
            return Err(SubmitError::BadStatus(status.as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let rid = extract_rid(&body).ok_or(SubmitError::NoHandleFound)?;
        debug!(rid, "BLAST submitted");
        Ok(rid.to_string())
    }

    fn fetch(&self, rid: &str) -> Result<String, ServiceError> {
        let response = self
            .client
            .get(&self.base_url)
            .timeout(self.poll_timeout)
            .query(&status_query(rid))
            .send()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status(status.as_u16()));
        }

        response
            .text()
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }
}

/// Query string of a `CMD=Get` status request. Uses the submit format.
fn status_query(rid: &str) -> [(&'static str, &str); 3] {
    [("CMD", "Get"), ("FORMAT_TYPE", RESULT_FORMAT), ("RID", rid)]
}

/// Finds the job handle in a submission reply (`RID = <token>`).
pub fn extract_rid(body: &str) -> Option<&str> {
    RID_PATTERN
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
