use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "do", "does", "for", "how", "i", "in", "is", "it", "my", "of",
    "on", "or", "the", "to", "what", "with", "you", "your",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Passage {
    pub source: PathBuf,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub source: String,
    pub score: usize,
    pub text: String,
}

#[derive(Clone, Debug, Default)]
pub struct KnowledgeBase {
    passages: Vec<Passage>,
    documents: Vec<PathBuf>,
}

impl KnowledgeBase {
    /// Loads every readable text document listed in `knowledge_files` plus
    /// the regular files directly inside `files_dir`. Relative entries in
    /// `knowledge_files` resolve against `files_dir`.
    pub fn load(files_dir: &Path, knowledge_files: &[PathBuf]) -> Self {
        let mut candidates = Vec::new();

        for file in knowledge_files {
            let resolved = if file.is_absolute() {
                file.clone()
            } else {
                files_dir.join(file)
            };
            candidates.push(resolved);
        }

        match fs::read_dir(files_dir) {
            Ok(entries) => {
                let mut listed = entries
                    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                    .filter(|path| path.is_file())
                    .collect::<Vec<_>>();
                listed.sort();
                candidates.extend(listed);
            }
            Err(error) => {
                debug!(
                    event_name = "core.knowledge.files_dir_unavailable",
                    files_dir = %files_dir.display(),
                    error = %error,
                    "knowledge files directory not readable"
                );
            }
        }

        let mut seen = BTreeSet::new();
        let mut knowledge = Self::default();
        for path in candidates {
            let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if !seen.insert(key) {
                continue;
            }

            match fs::read_to_string(&path) {
                Ok(contents) => knowledge.add_document(path, &contents),
                Err(error) => {
                    warn!(
                        event_name = "core.knowledge.file_skipped",
                        path = %path.display(),
                        error = %error,
                        "knowledge file skipped"
                    );
                }
            }
        }

        knowledge
    }

    /// Splits `contents` into passages at blank lines. Line endings may be
    /// `\n` or `\r\n`.
    pub fn add_document(&mut self, source: PathBuf, contents: &str) {
        let before = self.passages.len();
        let mut block = Vec::new();
        for line in contents.lines().chain(std::iter::once("")) {
            if line.trim().is_empty() {
                if !block.is_empty() {
                    let text = block.join("\n");
                    self.passages.push(Passage { source: source.clone(), text });
                    block.clear();
                }
            } else {
                block.push(line.trim_end());
            }
        }
        if self.passages.len() > before {
            self.documents.push(source);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn documents(&self) -> &[PathBuf] {
        &self.documents
    }

    pub fn passage_count(&self) -> usize {
        self.passages.len()
    }

    /// Ranks passages by how many distinct query terms they share; ties keep
    /// document order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let query_terms = terms(query);
        if query_terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored = self
            .passages
            .iter()
            .enumerate()
            .filter_map(|(index, passage)| {
                let passage_terms = terms(&passage.text);
                let score = query_terms.intersection(&passage_terms).count();
                (score > 0).then_some((score, index, passage))
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.0.cmp(&left.0).then(left.1.cmp(&right.1)));

        scored
            .into_iter()
            .take(limit)
            .map(|(score, _, passage)| SearchHit {
                source: passage.source.display().to_string(),
                score,
                text: passage.text.clone(),
            })
            .collect()
    }
}

fn terms(text: &str) -> BTreeSet<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() {
            sanitized.extend(character.to_lowercase());
        } else {
            sanitized.push(' ');
        }
    }

    sanitized
        .split_whitespace()
        .filter(|token| token.len() > 1 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}
