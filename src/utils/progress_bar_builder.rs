use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";
const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

pub(crate) struct ProgressBarBuilder {
    message: String,
    length: Option<u64>,
    tick: Option<Duration>,
}

impl ProgressBarBuilder {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            length: None,
            tick: None,
        }
    }

    /// Turns the spinner into a bar of `length` steps.
    pub(crate) fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub(crate) fn with_tick(mut self, interval: Duration) -> Self {
        self.tick = Some(interval);
        self
    }

    pub(crate) fn build(self) -> Result<ProgressBar> {
        let (pb, style) = match self.length {
            Some(length) => (
                ProgressBar::new(length),
                ProgressStyle::default_bar()
                    .template(BAR_TEMPLATE)?
                    .progress_chars("=>-"),
            ),
            None => (
                ProgressBar::new_spinner(),
                ProgressStyle::default_spinner().template(SPINNER_TEMPLATE)?,
            ),
        };

        pb.set_style(style);
        pb.set_message(self.message);

        if let Some(interval) = self.tick {
            pb.enable_steady_tick(interval);
        }

        Ok(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_has_length() {
        let pb = ProgressBarBuilder::new("Searching").with_length(12).build().unwrap();
        assert_eq!(pb.length(), Some(12));
    }

    #[test]
    fn test_spinner_has_no_length() {
        let pb = ProgressBarBuilder::new("Fetching").build().unwrap();
        assert_eq!(pb.length(), None);
        assert_eq!(pb.message(), "Fetching");
    }
}
