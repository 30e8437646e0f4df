//! pure text helpers: input trimming, control words, stance parsing and
//! label stripping for assistant output.

use regex::Regex;
use std::sync::LazyLock;

/// commands the engine recognises outside of quiz answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWord {
    /// "no" / "nah" while the invitation is pending
    Decline,
    /// "retake" once the quiz is done
    Retake,
}

/// how a free-text quiz answer reads on the agree/disagree scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stance {
    Agree,
    Disagree,
    Neutral,
}

impl Stance {
    pub fn parse(answer: &str) -> Self {
        let word = answer
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        match word.as_str() {
            "agree" | "yes" | "y" | "yeah" | "yep" | "sure" | "true" => Stance::Agree,
            "disagree" | "no" | "n" | "nah" | "nope" | "false" => Stance::Disagree,
            _ => Stance::Neutral,
        }
    }

    /// +1 / -1 / 0, as summed by the server-side rule.
    pub fn signum(self) -> i32 {
        match self {
            Stance::Agree => 1,
            Stance::Disagree => -1,
            Stance::Neutral => 0,
        }
    }
}

/// trimmed input, or `None` when nothing but whitespace was submitted.
pub fn normalize_input(raw: &str) -> Option<&str> {
    let t = raw.trim();
    (!t.is_empty()).then_some(t)
}

/// exact-token match after trimming, case-insensitive.
pub fn control_word(input: &str) -> Option<ControlWord> {
    let t = input.trim();
    if t.eq_ignore_ascii_case("no") || t.eq_ignore_ascii_case("nah") {
        Some(ControlWord::Decline)
    } else if t.eq_ignore_ascii_case("retake") {
        Some(ControlWord::Retake)
    } else {
        None
    }
}

static LABEL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*[*_]{0,2}(?:title|hook|summary)[*_]{0,2}[ \t]*:[*_]{0,2}[ \t]*")
        .expect("static regex")
});

static BARE_LABEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*[*_]{0,2}(?:title|hook|summary)[*_]{0,2}[ \t]*(?:\r?\n|$)")
        .expect("static regex")
});

/// removes `TITLE:` / `HOOK:` / `SUMMARY:` style prefixes (optionally in
/// markdown bold) and lines holding nothing but such a label.
pub fn strip_labels(text: &str) -> String {
    let without_lines = BARE_LABEL_LINE.replace_all(text, "");
    LABEL_PREFIX
        .replace_all(&without_lines, "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_is_not_input() {
        assert_eq!(normalize_input("   \t\n"), None);
        assert_eq!(normalize_input(""), None);
        assert_eq!(normalize_input("  hi  "), Some("hi"));
    }

    #[test]
    fn control_words_are_exact_and_case_insensitive() {
        assert_eq!(control_word("no"), Some(ControlWord::Decline));
        assert_eq!(control_word("NAH "), Some(ControlWord::Decline));
        assert_eq!(control_word("  ReTaKe\n"), Some(ControlWord::Retake));
        assert_eq!(control_word("nope"), None);
        assert_eq!(control_word("no thanks"), None);
        assert_eq!(control_word("retake the quiz"), None);
        assert_eq!(control_word("know"), None);
    }

    #[test]
    fn stance_parsing() {
        assert_eq!(Stance::parse("Yes!"), Stance::Agree);
        assert_eq!(Stance::parse(" agree "), Stance::Agree);
        assert_eq!(Stance::parse("DISAGREE."), Stance::Disagree);
        assert_eq!(Stance::parse("nah"), Stance::Disagree);
        assert_eq!(Stance::parse("it depends"), Stance::Neutral);
        assert_eq!(Stance::parse(""), Stance::Neutral);
        assert_eq!(Stance::Disagree.signum(), -1);
    }

    #[test]
    fn strips_prefixed_labels() {
        let raw = "TITLE: Big vote today\nHOOK: Nobody saw it coming\nSUMMARY: The bill passed.";
        assert_eq!(
            strip_labels(raw),
            "Big vote today\nNobody saw it coming\nThe bill passed."
        );
        assert_eq!(strip_labels("**Hook:** wow"), "wow");
    }

    #[test]
    fn strips_bare_label_lines() {
        let raw = "TITLE\nBig vote today\nHOOK\nNobody saw it coming";
        assert_eq!(strip_labels(raw), "Big vote today\nNobody saw it coming");
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        let raw = "Summary of events: calm.\nThe title: is fine";
        assert_eq!(strip_labels(raw), raw);
    }
}
