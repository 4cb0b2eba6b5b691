use crate::config::Config;
use serde::{Deserialize, Serialize};

/// Parameters handed to the model builder for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub lang: String,
    pub stemmer: String,
    pub stopwords: String,
    pub vocabulary: Option<String>,
    pub vocabulary_name: String,
    pub features: FeatureSet,
    pub min_num_occur: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub basic: bool,
    pub keyphraseness: bool,
    pub frequency: bool,
    pub positions: bool,
    pub length: bool,
    pub thesaurus: bool,
}

impl TrainingParams {
    pub fn from_config(cfg: &Config) -> Self {
        let vocabulary = if cfg.tagger.vocabulary.trim().is_empty() {
            None
        } else {
            Some(cfg.tagger.vocabulary.clone())
        };
        Self {
            lang: cfg.effective_lang(),
            stemmer: cfg.effective_stemmer(),
            stopwords: cfg.effective_stopwords(),
            vocabulary,
            vocabulary_name: cfg.tagger.vocabulary_name.clone(),
            features: FeatureSet {
                basic: cfg.features.basic,
                keyphraseness: cfg.features.keyphraseness,
                frequency: cfg.features.frequency,
                positions: cfg.features.positions,
                length: cfg.features.length,
                thesaurus: cfg.features.thesaurus,
            },
            min_num_occur: cfg.features.min_num_occur,
        }
    }
}

/// Model produced by an external training program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model: serde_json::Value,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOut {
    pub ok: bool,
    #[serde(default)]
    pub model: serde_json::Value,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderDiag {
    pub command: String,
    #[serde(default)]
    pub version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}
