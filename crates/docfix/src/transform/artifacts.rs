//! Export-tool noise removal
//!
//! The wiki exporter leaves the clipboard toast text "Link copied!" next to
//! every heading permalink, and assistant-generated pages end sections with
//! "Ask Devin about ..." prompts.

use regex::Regex;
use std::sync::OnceLock;

/// Clipboard toast left behind by heading permalinks.
pub const LINK_COPIED: &str = "Link copied!";

/// Prefix of assistant prompt lines that are dropped whole.
pub const ASK_PROMPT_PREFIX: &str = "Ask Devin about";

static LINK_COPIED_RE: OnceLock<Regex> = OnceLock::new();

fn link_copied_regex() -> &'static Regex {
    LINK_COPIED_RE
        .get_or_init(|| Regex::new(r"\s*Link copied!").expect("artifact regex should compile"))
}

/// Remove known export artifacts from `text`.
///
/// Each "Link copied!" is removed together with the whitespace directly in
/// front of it. The result never contains the literal, even when a removal
/// splices two halves of a new occurrence together.
///
/// # Example
///
/// ```
/// use docfix::transform::strip_artifacts;
///
/// assert_eq!(strip_artifacts("## Setup Link copied!\nBody\n"), "## Setup\nBody\n");
/// ```
pub fn strip_artifacts(text: &str) -> String {
    let text = remove_link_copied(text);
    remove_prompt_lines(&text)
}

fn remove_link_copied(text: &str) -> String {
    let mut current = text.to_string();
    while current.contains(LINK_COPIED) {
        current = link_copied_regex().replace_all(&current, "").into_owned();
    }
    current
}

fn remove_prompt_lines(text: &str) -> String {
    if !text.contains(ASK_PROMPT_PREFIX) {
        return text.to_string();
    }
    text.split_inclusive('\n')
        .filter(|line| !line.trim().starts_with(ASK_PROMPT_PREFIX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_mid_line_occurrence() {
        assert_eq!(strip_artifacts("before Link copied! after"), "before after");
    }

    #[test]
    fn test_removes_preceding_blank_lines() {
        let input = "## Heading\n\nLink copied!\n\nParagraph\n";
        assert_eq!(strip_artifacts(input), "## Heading\n\nParagraph\n");
    }

    #[test]
    fn test_spliced_occurrence_is_removed() {
        let input = "Link copLink copied!ied!";
        let output = strip_artifacts(input);
        assert!(!output.contains(LINK_COPIED));
        assert_eq!(output, "");
    }

    #[test]
    fn test_drops_prompt_lines() {
        let input = "# Title\nText\n  Ask Devin about this repo\nMore\n";
        assert_eq!(strip_artifacts(input), "# Title\nText\nMore\n");
    }

    #[test]
    fn test_text_without_artifacts_is_unchanged() {
        let input = "# Title\n\nNothing to remove. Link copying is fine.\n";
        assert_eq!(strip_artifacts(input), input);
    }

    #[test]
    fn test_idempotent() {
        let input = "a Link copied!\nAsk Devin about x\nb\n";
        let once = strip_artifacts(input);
        assert_eq!(strip_artifacts(&once), once);
    }
}
