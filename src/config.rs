use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub tagger: Tagger,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub builder: Builder,
    #[serde(default)]
    pub corpus: Corpus,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub output: Output,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Document language; an empty or "auto" setting means English.
    pub fn effective_lang(&self) -> String {
        let lang = self.tagger.lang.trim();
        if lang.is_empty() || lang.eq_ignore_ascii_case("auto") {
            "en".to_string()
        } else {
            lang.to_ascii_lowercase()
        }
    }

    pub fn effective_stemmer(&self) -> String {
        let raw = self.tagger.stemmer.trim();
        if !raw.is_empty() && !raw.eq_ignore_ascii_case("auto") {
            return raw.to_string();
        }
        match self.effective_lang().as_str() {
            "en" => "porter",
            "fr" => "french",
            "es" => "spanish",
            "de" => "german",
            "it" => "italian",
            "pt" => "portuguese",
            "nl" => "dutch",
            _ => "none",
        }
        .to_string()
    }

    pub fn effective_stopwords(&self) -> String {
        let raw = self.tagger.stopwords.trim();
        if !raw.is_empty() && !raw.eq_ignore_ascii_case("auto") {
            return raw.to_string();
        }
        match self.effective_lang().as_str() {
            "en" => "english",
            "fr" => "french",
            "es" => "spanish",
            "de" => "german",
            "it" => "italian",
            "pt" => "portuguese",
            "nl" => "dutch",
            _ => "none",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub name: String,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            name: "default".into(),
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tagger {
    pub lang: String,
    pub stemmer: String,
    pub stopwords: String,
    pub vocabulary: String,
    pub vocabulary_name: String,
}
impl Default for Tagger {
    fn default() -> Self {
        Self {
            lang: "".into(),
            stemmer: "auto".into(),
            stopwords: "auto".into(),
            vocabulary: "".into(),
            vocabulary_name: "dummy.ttl".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub basic: bool,
    pub keyphraseness: bool,
    pub frequency: bool,
    pub positions: bool,
    pub length: bool,
    pub thesaurus: bool,
    pub min_num_occur: u32,
}
impl Default for Features {
    fn default() -> Self {
        Self {
            basic: true,
            keyphraseness: true,
            frequency: true,
            positions: true,
            length: true,
            thesaurus: true,
            min_num_occur: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Builder {
    pub command: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
    pub timeout_seconds: u64,
    pub doctor_timeout_seconds: u64,
    pub poll_interval_ms: u64,
}
impl Default for Builder {
    fn default() -> Self {
        Self {
            command: "python3".into(),
            args: vec!["scripts/maui_train.py".into()],
            env: Default::default(),
            timeout_seconds: 0,
            doctor_timeout_seconds: 60,
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Corpus {
    pub skip_bad_lines: bool,
    pub normalize_unicode: bool,
    pub collapse_whitespace: bool,
    pub min_content_chars: usize,
    pub require_topics: bool,
}
impl Default for Corpus {
    fn default() -> Self {
        Self {
            skip_bad_lines: true,
            normalize_unicode: true,
            collapse_whitespace: true,
            min_content_chars: 1,
            require_topics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub write_report_json: bool,
    pub write_model_json: bool,
    pub report_filename: String,
    pub model_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_report_json: true,
            write_model_json: true,
            report_filename: "report.json".into(),
            model_filename: "model.json".into(),
        }
    }
}
