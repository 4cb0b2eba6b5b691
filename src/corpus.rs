use crate::{config, util::sha256_hex};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Ordered training documents handed to a model builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub documents: Vec<Document>,
}

impl Corpus {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn load(path: &std::path::Path, cfg: &config::Corpus) -> Result<(Corpus, usize)> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open corpus: {}", path.display()))?;
        Self::from_jsonl(std::io::BufReader::new(file), cfg)
            .with_context(|| format!("reading corpus: {}", path.display()))
    }

    /// Reads one JSON document per line. Returns the corpus and the number of
    /// lines that were dropped as unusable.
    pub fn from_jsonl<R: BufRead>(reader: R, cfg: &config::Corpus) -> Result<(Corpus, usize)> {
        let ws = Regex::new(r"\s+")?;
        let mut documents = Vec::new();
        let mut skipped = 0usize;

        for (i, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("read line {}", i + 1))?;
            if line.trim().is_empty() {
                continue;
            }

            let mut doc: Document = match serde_json::from_str(&line) {
                Ok(doc) => doc,
                Err(err) if cfg.skip_bad_lines => {
                    warn!("skipping line {}: {err}", i + 1);
                    skipped += 1;
                    continue;
                }
                Err(err) => return Err(anyhow!("invalid JSON on line {}: {err}", i + 1)),
            };

            if cfg.normalize_unicode {
                doc.content = doc.content.nfkc().collect::<String>();
            }
            if cfg.collapse_whitespace {
                doc.content = ws.replace_all(doc.content.trim(), " ").into_owned();
            }

            if doc.content.chars().count() < cfg.min_content_chars {
                debug!("skipping line {}: content too short", i + 1);
                skipped += 1;
                continue;
            }
            if cfg.require_topics && doc.topics.is_empty() {
                debug!("skipping line {}: no topics", i + 1);
                skipped += 1;
                continue;
            }

            documents.push(doc);
        }

        Ok((Corpus { documents }, skipped))
    }

    /// Stable fingerprint of document ids and contents, in order.
    pub fn digest(&self) -> String {
        let mut buf = Vec::new();
        for doc in &self.documents {
            buf.extend_from_slice(doc.id.as_deref().unwrap_or("").as_bytes());
            buf.push(0);
            buf.extend_from_slice(doc.content.as_bytes());
            buf.push(0);
        }
        sha256_hex(&buf)
    }
}
