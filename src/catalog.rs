//! quiz question catalogs.
//!
//! a catalog is an ordered, non-empty list of questions. each question
//! feeds one axis with a signed weight depending on whether the user
//! agrees or disagrees. catalogs are configuration: two built-in sets
//! ship with the crate and any other set can be loaded from json.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("quiz catalog has no questions")]
    Empty,
    #[error("question {index} has an empty {field}")]
    Blank { index: usize, field: &'static str },
    #[error("failed to parse quiz catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read quiz catalog: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub text: String,
    pub axis: String,
    #[serde(alias = "agreeValue", alias = "agreeWeight")]
    pub agree_weight: i32,
    #[serde(alias = "disagreeValue", alias = "disagreeWeight")]
    pub disagree_weight: i32,
}

impl QuizQuestion {
    pub fn new(
        text: impl Into<String>,
        axis: impl Into<String>,
        agree_weight: i32,
        disagree_weight: i32,
    ) -> Self {
        Self {
            text: text.into(),
            axis: axis.into(),
            agree_weight,
            disagree_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizCatalog {
    questions: Vec<QuizQuestion>,
}

impl QuizCatalog {
    pub fn new(questions: Vec<QuizQuestion>) -> Result<Self, CatalogError> {
        if questions.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (index, q) in questions.iter().enumerate() {
            if q.text.trim().is_empty() {
                return Err(CatalogError::Blank { index, field: "text" });
            }
            if q.axis.trim().is_empty() {
                return Err(CatalogError::Blank { index, field: "axis" });
            }
        }
        Ok(Self { questions })
    }

    /// the five weighted statements over the economic, social and
    /// authoritarian axes.
    pub fn axis_quiz() -> Self {
        Self {
            questions: vec![
                QuizQuestion::new(
                    "Government should regulate the economy more than it does now.",
                    "economic",
                    -1,
                    1,
                ),
                QuizQuestion::new(
                    "Personal freedoms are more important than national security.",
                    "social",
                    1,
                    -1,
                ),
                QuizQuestion::new(
                    "Strong leadership is more important than democracy.",
                    "authoritarian",
                    1,
                    -1,
                ),
                QuizQuestion::new(
                    "The market should be free from government intervention.",
                    "economic",
                    1,
                    -1,
                ),
                QuizQuestion::new(
                    "Traditions should be preserved, even if they limit freedom.",
                    "social",
                    -1,
                    1,
                ),
            ],
        }
    }

    /// the five open questions the chat widget asks before handing answers
    /// to the remote scorer.
    pub fn free_text() -> Self {
        Self {
            questions: vec![
                QuizQuestion::new(
                    "Should the government provide universal healthcare?",
                    "economic",
                    -1,
                    1,
                ),
                QuizQuestion::new("Is climate change a top priority?", "social", 1, -1),
                QuizQuestion::new("Should taxes be increased for the wealthy?", "economic", -1, 1),
                QuizQuestion::new(
                    "Do you support stricter immigration policies?",
                    "social",
                    -1,
                    1,
                ),
                QuizQuestion::new("Should education be free at all levels?", "economic", -1, 1),
            ],
        }
    }

    /// parses a json array of questions. both snake_case weights and the
    /// `agreeValue`/`disagreeValue` spelling are accepted.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let questions: Vec<QuizQuestion> = serde_json::from_str(json)?;
        Self::new(questions)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// always false for a constructed catalog.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QuizQuestion> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuizQuestion> {
        self.questions.iter()
    }

    /// distinct axis tags, sorted.
    pub fn axes(&self) -> BTreeSet<&str> {
        self.questions.iter().map(|q| q.axis.as_str()).collect()
    }
}

impl Default for QuizCatalog {
    fn default() -> Self {
        Self::free_text()
    }
}
