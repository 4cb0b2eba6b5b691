pub mod command;
pub mod types;

use crate::corpus::Corpus;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use types::{BuilderDiag, FeatureSet, TrainOut, TrainedModel, TrainingParams};

/// The long-running model computation. Implementations may poll `cancel`
/// but are not required to.
pub trait ModelBuilder: Send + Sync + 'static {
    type Model: Send + 'static;

    fn build_model(
        &self,
        params: &TrainingParams,
        corpus: &Corpus,
        cancel: &CancelToken,
    ) -> Result<Self::Model>;
}

/// Cooperative cancellation signal shared between a trainer and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
