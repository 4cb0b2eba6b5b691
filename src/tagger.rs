use crate::{
    config::Config,
    engine::TrainingParams,
    report::TrainingReport,
    trainer::{ConfigHolder, ModelHolder},
};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Holds the configuration used for training and the model currently in use
/// for tagging, together with the report of the run that produced it.
pub struct Tagger<M> {
    cfg: RwLock<Config>,
    current: RwLock<Option<Published<M>>>,
}

pub struct Published<M> {
    pub model: Arc<M>,
    pub report: TrainingReport,
}

impl<M> Clone for Published<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            report: self.report.clone(),
        }
    }
}

impl<M> Tagger<M> {
    pub fn new(cfg: &Config) -> Self {
        Self {
            cfg: RwLock::new(cfg.clone()),
            current: RwLock::new(None),
        }
    }

    pub fn config(&self) -> Config {
        self.cfg.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the configuration; takes effect at the next `train`.
    pub fn set_config(&self, cfg: Config) {
        *self.cfg.write().unwrap_or_else(PoisonError::into_inner) = cfg;
    }

    pub fn model(&self) -> Option<Published<M>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_trained(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<M: Send + Sync + 'static> ConfigHolder for Tagger<M> {
    fn training_params(&self) -> anyhow::Result<TrainingParams> {
        let cfg = self.cfg.read().unwrap_or_else(PoisonError::into_inner);
        if !cfg.tagger.vocabulary.trim().is_empty() {
            let path = std::path::Path::new(&cfg.tagger.vocabulary);
            if !path.exists() {
                anyhow::bail!("vocabulary does not exist: {}", path.display());
            }
        }
        Ok(TrainingParams::from_config(&cfg))
    }
}

impl<M: Send + Sync + 'static> ModelHolder<M> for Tagger<M> {
    fn publish(&self, model: M, report: TrainingReport) {
        info!(
            "publishing model trained on {} documents",
            report.document_count.unwrap_or(0)
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Published {
            model: Arc::new(model),
            report,
        });
    }
}
