//! Line-prefix trimming
//!
//! Exported pages start with navigation chrome ("Skip to content", repository
//! menus, "Last indexed" banners) before the first real heading.

use regex::Regex;
use std::sync::OnceLock;

static FIRST_HEADER: OnceLock<Regex> = OnceLock::new();

fn first_header_regex() -> &'static Regex {
    FIRST_HEADER.get_or_init(|| Regex::new(r"(?m)^#+[ \t]").expect("header regex should compile"))
}

/// Drop every line before the first Markdown header.
///
/// A header is one or more `#` followed by whitespace at the start of a line.
/// Text without a header is returned unchanged.
///
/// # Example
///
/// ```
/// use docfix::transform::trim_preamble;
///
/// assert_eq!(trim_preamble("Menu\nSearch\n# Title\nBody\n"), "# Title\nBody\n");
/// assert_eq!(trim_preamble("no headers here\n"), "no headers here\n");
/// ```
pub fn trim_preamble(text: &str) -> String {
    match first_header_regex().find(text) {
        Some(m) => text[m.start()..].to_string(),
        None => text.to_string(),
    }
}
