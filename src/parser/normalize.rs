use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

// Only short asides are removed; anything longer is kept verbatim.
static PARENTHETICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]{1,20}\)").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// Line breaks and hard spaces become spaces; other control and format
// characters (zero-width spaces, BOM, soft hyphen) are dropped.
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{a0}\x{2028}\x{2029}\r\t\n]").unwrap());
static INVISIBLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{Cc}\p{Cf}]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeStep {
    Parentheticals,
    Hyphens,
    ControlChars,
    Whitespace,
}

impl NormalizeStep {
    pub const ALL: [NormalizeStep; 4] = [
        NormalizeStep::Parentheticals,
        NormalizeStep::Hyphens,
        NormalizeStep::ControlChars,
        NormalizeStep::Whitespace,
    ];

    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self {
            NormalizeStep::Parentheticals => PARENTHETICAL_RE.replace_all(text, ""),
            NormalizeStep::Hyphens => {
                if text.contains('-') {
                    Cow::Owned(text.replace('-', " "))
                } else {
                    Cow::Borrowed(text)
                }
            }
            NormalizeStep::ControlChars => {
                let spaced = BREAK_RE.replace_all(text, " ");
                if INVISIBLE_RE.is_match(&spaced) {
                    Cow::Owned(INVISIBLE_RE.replace_all(&spaced, "").into_owned())
                } else {
                    spaced
                }
            }
            NormalizeStep::Whitespace => match WHITESPACE_RE.replace_all(text, " ") {
                Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
                Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
            },
        }
    }
}

/// Ordered cleanup of a raw ingredient blob.
#[derive(Debug, Clone)]
pub struct Normalizer {
    steps: Vec<NormalizeStep>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            steps: NormalizeStep::ALL.to_vec(),
        }
    }
}

impl Normalizer {
    pub fn new(steps: Vec<NormalizeStep>) -> Self {
        Normalizer { steps }
    }

    /// Same pipeline with `step` skipped. The remaining steps keep their order.
    pub fn without(mut self, step: NormalizeStep) -> Self {
        self.steps.retain(|s| *s != step);
        self
    }

    pub fn steps(&self) -> &[NormalizeStep] {
        &self.steps
    }

    pub fn normalize(&self, raw: Option<&str>) -> Option<String> {
        let mut text = raw?.to_string();
        for step in &self.steps {
            text = step.apply(&text).into_owned();
        }
        Some(text)
    }
}
