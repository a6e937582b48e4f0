//! Per-document rewrite passes
//!
//! Each pass is a pure `&str -> String` function. They are composed in a fixed
//! order by [`process_text`]: preamble trimming, artifact stripping, wrapped
//! README link joining, link rewriting, then Mermaid sanitization. Every pass is conservative: when a
//! pattern is not an exact match the text passes through unchanged.

pub mod artifacts;
pub mod links;
pub mod mermaid;
pub mod preamble;

pub use artifacts::strip_artifacts;
pub use links::{rewrite_links, LinkContext};
pub use mermaid::sanitize_mermaid;
pub use preamble::trim_preamble;

use regex::Regex;
use std::sync::OnceLock;

/// Apply every per-document pass in order.
///
/// # Example
///
/// ```
/// use docfix::anchors::AnchorTable;
/// use docfix::transform::{process_text, LinkContext};
///
/// let anchors = AnchorTable::default();
/// let text = "Menu\n# Title\nSee [x](/acme/widget/blob/abc123def/a.py) Link copied!\n";
/// let cleaned = process_text(text, &LinkContext::new(&anchors));
/// assert_eq!(cleaned, "# Title\nSee [x](https://github.com/acme/widget/a.py)\n");
/// ```
pub fn process_text(text: &str, ctx: &LinkContext<'_>) -> String {
    let text = trim_preamble(text);
    let text = strip_artifacts(&text);
    let text = if ctx.is_readme() {
        links::join_wrapped_links(&text)
    } else {
        text
    };
    let text = rewrite_links(&text, ctx);
    sanitize_mermaid(&text)
}

/// Opening or closing marker of a fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fence {
    pub ch: char,
    pub len: usize,
}

impl Fence {
    /// Parse a fence marker at the start of a line (up to three spaces of indent).
    pub(crate) fn parse(line: &str) -> Option<Fence> {
        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > 3 {
            return None;
        }
        let rest = &line[indent..];
        let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = rest.chars().take_while(|c| *c == ch).count();
        (len >= 3).then_some(Fence { ch, len })
    }

    /// Whether `other` closes a block opened by `self`.
    pub(crate) fn is_closed_by(&self, other: &Fence) -> bool {
        self.ch == other.ch && other.len >= self.len
    }
}

/// Tracks whether the current line is inside a fenced code block.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    open: Option<Fence>,
}

impl FenceTracker {
    /// Feed one line. Returns true when the line is a fence marker or fenced content.
    pub(crate) fn observe(&mut self, line: &str) -> bool {
        match (self.open, Fence::parse(line)) {
            (None, Some(fence)) => {
                self.open = Some(fence);
                true
            }
            (Some(open), Some(fence)) if open.is_closed_by(&fence) => {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

/// Split a line produced by `split_inclusive('\n')` into content and ending.
pub(crate) fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

static ATX_HEADING: OnceLock<Regex> = OnceLock::new();

/// Text of an ATX heading line (`## Title ##` yields `Title`).
pub(crate) fn heading_text(line: &str) -> Option<&str> {
    let re = ATX_HEADING
        .get_or_init(|| Regex::new(r"^#{1,6}[ \t]+(.+)$").expect("heading regex should compile"));
    let caps = re.captures(line)?;
    let text = caps.get(1)?.as_str().trim_end();
    let text = text.trim_end_matches('#').trim_end();
    (!text.is_empty()).then_some(text)
}
