use crate::util::now_rfc3339;
use serde::{Deserialize, Serialize};

/// Telemetry for one training run.
///
/// A report is created empty when the trainer is locked and filled in as the run
/// progresses. Once `finished` is set nothing writes to it again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub started: Option<String>,
    pub finished: Option<String>,
    pub document_count: Option<usize>,
    pub skipped_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_digest: Option<String>,
}

impl TrainingReport {
    pub fn log_start(&mut self) {
        self.started = Some(now_rfc3339());
    }

    pub fn log_document_counts(&mut self, documents: usize, skipped: usize) {
        self.document_count = Some(documents);
        self.skipped_count = Some(skipped);
    }

    pub fn log_corpus_digest(&mut self, digest: String) {
        self.corpus_digest = Some(digest);
    }

    pub fn log_end(&mut self) {
        self.finished = Some(now_rfc3339());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }
}
