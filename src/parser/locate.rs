use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Node};
use serde::Deserialize;
use tracing::debug;

/// One content block of a product page, in page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    /// HTML fragment; walked node by node when plain position is not enough.
    Markup(String),
}

impl ContentBlock {
    pub fn text(&self) -> String {
        match self {
            ContentBlock::Text(t) => t.clone(),
            ContentBlock::Markup(html) => {
                let fragment = Html::parse_fragment(html);
                element_text(&fragment.root_element())
            }
        }
    }

    /// Candidate spans in document order: top-level nodes for markup, lines for text.
    fn candidate_spans(&self, min_commas: usize) -> Vec<String> {
        match self {
            ContentBlock::Text(t) => t
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            ContentBlock::Markup(html) => {
                let fragment = Html::parse_fragment(html);
                let root = fragment.root_element();
                let mut spans = Vec::new();
                if let Some(span) = first_dense_child(root, min_commas) {
                    spans.push(span);
                }
                spans
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateStrategy {
    /// The block at the configured position, taken as-is.
    PositionalBlock,
    /// The first node or sibling whose text is comma-dense.
    CommaDense,
}

impl LocateStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LocateStrategy::PositionalBlock => "positional_block",
            LocateStrategy::CommaDense => "comma_dense",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedBlock {
    pub strategy: &'static str,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Locator {
    pub chain: Vec<LocateStrategy>,
    /// 1-based position of the ingredients block.
    pub position: usize,
    pub min_commas: usize,
    pub boilerplate: Vec<String>,
}

impl Default for Locator {
    fn default() -> Self {
        Locator {
            chain: vec![LocateStrategy::PositionalBlock, LocateStrategy::CommaDense],
            position: 3,
            min_commas: 10,
            boilerplate: Vec::new(),
        }
    }
}

impl Locator {
    pub fn locate(&self, blocks: &[ContentBlock]) -> Option<LocatedBlock> {
        if blocks.is_empty() {
            return None;
        }
        for strategy in &self.chain {
            let found = match strategy {
                LocateStrategy::PositionalBlock => self.positional(blocks),
                LocateStrategy::CommaDense => self.comma_dense(blocks),
            };
            let Some(raw) = found else { continue };

            let text = truncate_boilerplate(&raw, &self.boilerplate).trim().to_string();
            if text.is_empty() {
                continue;
            }
            debug!(strategy = strategy.name(), chars = text.len(), "located ingredient block");
            return Some(LocatedBlock {
                strategy: strategy.name(),
                text,
            });
        }
        debug!(blocks = blocks.len(), "no ingredient block located");
        None
    }

    fn positional(&self, blocks: &[ContentBlock]) -> Option<String> {
        let block = blocks.get(self.position.checked_sub(1)?)?;
        let text = block.text();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn comma_dense(&self, blocks: &[ContentBlock]) -> Option<String> {
        // Start at the expected slot, then walk the blocks that follow it.
        let start = self
            .position
            .checked_sub(1)
            .filter(|i| *i < blocks.len())
            .unwrap_or(0);
        blocks[start..]
            .iter()
            .flat_map(|b| b.candidate_spans(self.min_commas))
            .find(|span| comma_count(span) >= self.min_commas)
    }
}

fn comma_count(s: &str) -> usize {
    s.matches(',').count()
}

/// Walk `parent`'s children and their siblings; return the tightest
/// comma-dense span.
fn first_dense_child(parent: ElementRef<'_>, min_commas: usize) -> Option<String> {
    for child in parent.children() {
        let text = match child.value() {
            Node::Text(t) => t.trim().to_string(),
            Node::Element(_) => match ElementRef::wrap(child) {
                Some(el) => element_text(&el),
                None => continue,
            },
            _ => continue,
        };
        if comma_count(&text) < min_commas {
            continue;
        }
        if let Some(el) = ElementRef::wrap(child) {
            if let Some(inner) = first_dense_child(el, min_commas) {
                return Some(inner);
            }
        }
        return Some(text);
    }
    None
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cut `text` at the earliest boilerplate marker that starts a sentence.
/// A marker at offset 0 is ignored so the whole block is never discarded.
pub fn truncate_boilerplate<'a>(text: &'a str, markers: &[String]) -> &'a str {
    let Some(re) = marker_regex(markers) else {
        return text;
    };

    let mut pos = 0;
    while let Some(m) = re.find_at(text, pos) {
        let idx = m.start();
        if idx > 0 && starts_sentence(&text[..idx]) {
            return &text[..idx];
        }
        // a rejected match may hide a marker that starts inside it
        pos = idx + text[idx..].chars().next().map_or(1, char::len_utf8);
    }
    text
}

fn marker_regex(markers: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = markers
        .iter()
        .filter(|m| !m.is_empty())
        .map(|m| regex::escape(m))
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    match RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            debug!(error = %e, "boilerplate markers not usable");
            None
        }
    }
}

fn starts_sentence(before: &str) -> bool {
    let trimmed = before.trim_end_matches([' ', '\u{a0}', '\t']);
    trimmed.is_empty()
        || trimmed.ends_with(['.', '!', '\n', '\r'])
        || before.ends_with(['\n', '\r'])
}
