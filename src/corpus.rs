//! The fixed knowledge corpus.
//!
//! A corpus is a small set of topic entries loaded from a TOML file once at
//! startup and held in memory, read-only, for the life of the process. There
//! is no reload path: corpus edits take effect on restart, matching the
//! lifetime of the embedding cache built on top of it.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// One corpus topic. The text submitted for embedding and injected into
/// prompts is the summary and details joined by a blank line.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeEntry {
    pub topic: String,
    pub summary: String,
    #[serde(default)]
    pub details: String,
}

impl KnowledgeEntry {
    /// Full text of the entry: summary and details, blank-line separated.
    pub fn text(&self) -> String {
        let summary = self.summary.trim();
        let details = self.details.trim();
        if details.is_empty() {
            summary.to_string()
        } else {
            format!("{summary}\n\n{details}")
        }
    }
}

/// Immutable set of knowledge entries.
#[derive(Debug, Clone)]
pub struct Corpus {
    entries: Vec<KnowledgeEntry>,
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(default)]
    entries: Vec<KnowledgeEntry>,
}

impl Corpus {
    /// Build a corpus from entries, validating topic ids.
    pub fn new(entries: Vec<KnowledgeEntry>) -> Result<Self> {
        if entries.is_empty() {
            bail!("corpus must contain at least one entry");
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            let topic = entry.topic.trim();
            if topic.is_empty() {
                bail!("corpus entry has an empty topic id");
            }
            if !seen.insert(topic.to_string()) {
                bail!("duplicate corpus topic: {}", topic);
            }
            if entry.text().is_empty() {
                bail!("corpus entry '{}' has no text", topic);
            }
        }

        Ok(Self { entries })
    }

    /// Load a corpus from a TOML file of `[[entries]]` tables.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
        let file: CorpusFile =
            toml::from_str(&content).with_context(|| "Failed to parse corpus file")?;
        Self::new(file.entries)
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(topic: &str, summary: &str, details: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            topic: topic.to_string(),
            summary: summary.to_string(),
            details: details.to_string(),
        }
    }

    #[test]
    fn test_entry_text_joins_summary_and_details() {
        let e = entry("a", "Summary line.", "Longer details here.");
        assert_eq!(e.text(), "Summary line.\n\nLonger details here.");
    }

    #[test]
    fn test_entry_text_without_details() {
        let e = entry("a", "Only a summary.", "  ");
        assert_eq!(e.text(), "Only a summary.");
    }

    #[test]
    fn test_rejects_empty_corpus() {
        assert!(Corpus::new(Vec::new()).is_err());
    }

    #[test]
    fn test_rejects_duplicate_topics() {
        let err = Corpus::new(vec![
            entry("pricing", "a", ""),
            entry("pricing", "b", ""),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_blank_topic() {
        assert!(Corpus::new(vec![entry("  ", "a", "")]).is_err());
    }

    #[test]
    fn test_parses_toml_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("corpus.toml");
        std::fs::write(
            &path,
            r#"
[[entries]]
topic = "onboarding"
summary = "How new customers get set up."
details = "Kickoff call, workspace provisioning, first sync."

[[entries]]
topic = "support"
summary = "Support channels and hours."
"#,
        )
        .unwrap();

        let corpus = Corpus::from_path(&path).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.entries()[0].topic, "onboarding");
        assert!(corpus.entries()[0].text().contains("Kickoff call"));
        assert_eq!(corpus.entries()[1].text(), "Support channels and hours.");
    }
}
