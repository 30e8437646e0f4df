//! bias scoring.
//!
//! two reductions live here:
//! - the axis rule used when the quiz is scored locally. it reads only the
//!   economic and social axes; other axes (authoritarian in the built-in
//!   catalog) are accumulated but never consulted.
//! - the summing rule the quiz server applies to raw answers.

use crate::catalog::{QuizCatalog, QuizQuestion};
use crate::text::Stance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const ECONOMIC: &str = "economic";
pub const SOCIAL: &str = "social";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasLabel {
    Left,
    #[default]
    Center,
    Right,
}

impl BiasLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            BiasLabel::Left => "left",
            BiasLabel::Center => "center",
            BiasLabel::Right => "right",
        }
    }
}

impl fmt::Display for BiasLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BiasLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(BiasLabel::Left),
            "center" => Ok(BiasLabel::Center),
            "right" => Ok(BiasLabel::Right),
            other => Err(format!("unknown bias label '{other}'")),
        }
    }
}

/// running signed score per axis. keys are exactly the catalog's axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisScores(BTreeMap<String, i32>);

impl AxisScores {
    pub fn for_catalog(catalog: &QuizCatalog) -> Self {
        Self(catalog.axes().into_iter().map(|a| (a.to_string(), 0)).collect())
    }

    pub fn apply(&mut self, question: &QuizQuestion, stance: Stance) {
        let delta = match stance {
            Stance::Agree => question.agree_weight,
            Stance::Disagree => question.disagree_weight,
            Stance::Neutral => 0,
        };
        *self.0.entry(question.axis.clone()).or_insert(0) += delta;
    }

    /// 0 for axes the catalog does not carry.
    pub fn get(&self, axis: &str) -> i32 {
        self.0.get(axis).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn classify(&self) -> BiasLabel {
        classify_axes(self.get(ECONOMIC), self.get(SOCIAL))
    }
}

pub fn classify_axes(economic: i32, social: i32) -> BiasLabel {
    if economic <= -2 && social >= 1 {
        BiasLabel::Left
    } else if economic >= 2 && social <= -1 {
        BiasLabel::Right
    } else {
        BiasLabel::Center
    }
}

/// scores free-text answers against the catalog, question by question.
/// answers past the end of the catalog are ignored.
pub fn score_answers<S: AsRef<str>>(catalog: &QuizCatalog, answers: &[S]) -> AxisScores {
    let mut scores = AxisScores::for_catalog(catalog);
    for (question, answer) in catalog.iter().zip(answers) {
        scores.apply(question, Stance::parse(answer.as_ref()));
    }
    scores
}

/// the server-side rule: sum of +1/-1/0 stances, strictly beyond ±3.
pub fn classify_total(total: i32) -> BiasLabel {
    if total < -3 {
        BiasLabel::Left
    } else if total > 3 {
        BiasLabel::Right
    } else {
        BiasLabel::Center
    }
}

pub fn classify_by_sum<S: AsRef<str>>(answers: &[S]) -> BiasLabel {
    let total = answers
        .iter()
        .map(|a| Stance::parse(a.as_ref()).signum())
        .sum();
    classify_total(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    // axis_quiz order: economic(-1/+1), social(+1/-1), authoritarian(+1/-1),
    // economic(+1/-1), social(-1/+1)

    #[test]
    fn left_at_threshold() {
        // economic: agree q0 (-1), disagree q3 (-1) => -2
        // social: agree q1 (+1), skip q4 => +1
        let answers = ["agree", "agree", "agree", "disagree", "maybe"];
        let scores = score_answers(&QuizCatalog::axis_quiz(), &answers);
        assert_eq!(scores.get(ECONOMIC), -2);
        assert_eq!(scores.get(SOCIAL), 1);
        assert_eq!(scores.classify(), BiasLabel::Left);
    }

    #[test]
    fn right_at_threshold() {
        let answers = ["disagree", "disagree", "no", "yes", "unsure"];
        let scores = score_answers(&QuizCatalog::axis_quiz(), &answers);
        assert_eq!(scores.get(ECONOMIC), 2);
        assert_eq!(scores.get(SOCIAL), -1);
        assert_eq!(scores.classify(), BiasLabel::Right);
    }

    #[test]
    fn neutral_answers_are_center() {
        let answers = ["hmm"; 5];
        let scores = score_answers(&QuizCatalog::axis_quiz(), &answers);
        assert!(scores.iter().all(|(_, v)| v == 0));
        assert_eq!(scores.classify(), BiasLabel::Center);
    }

    #[test]
    fn authoritarian_axis_does_not_move_the_label() {
        let mut scores = AxisScores::for_catalog(&QuizCatalog::axis_quiz());
        let strong = QuizQuestion::new("x", "authoritarian", 10, -10);
        scores.apply(&strong, Stance::Agree);
        assert_eq!(scores.get("authoritarian"), 10);
        assert_eq!(scores.classify(), BiasLabel::Center);
    }

    #[test]
    fn axis_rule_boundaries() {
        assert_eq!(classify_axes(-2, 1), BiasLabel::Left);
        assert_eq!(classify_axes(-1, 1), BiasLabel::Center);
        assert_eq!(classify_axes(-2, 0), BiasLabel::Center);
        assert_eq!(classify_axes(2, -1), BiasLabel::Right);
        assert_eq!(classify_axes(2, 0), BiasLabel::Center);
        assert_eq!(classify_axes(0, 0), BiasLabel::Center);
    }

    #[test]
    fn keys_match_catalog_axes() {
        let scores = AxisScores::for_catalog(&QuizCatalog::axis_quiz());
        let keys: Vec<_> = scores.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["authoritarian", "economic", "social"]);
    }

    #[test]
    fn summing_rule_is_strict() {
        assert_eq!(classify_total(-4), BiasLabel::Left);
        assert_eq!(classify_total(-3), BiasLabel::Center);
        assert_eq!(classify_total(3), BiasLabel::Center);
        assert_eq!(classify_total(4), BiasLabel::Right);
        assert_eq!(classify_by_sum(&["yes", "yes", "yes", "yes", "no"]), BiasLabel::Center);
        assert_eq!(classify_by_sum(&["no"; 5]), BiasLabel::Left);
    }

    #[test]
    fn label_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&BiasLabel::Right).unwrap(), "\"right\"");
        let parsed: BiasLabel = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(parsed, BiasLabel::Left);
        assert_eq!("CENTER".parse::<BiasLabel>(), Ok(BiasLabel::Center));
        assert!("up".parse::<BiasLabel>().is_err());
    }
}
