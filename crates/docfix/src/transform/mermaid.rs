//! Mermaid diagram sanitization
//!
//! Two fixes run inside fenced `mermaid` blocks:
//!
//! - Node labels lose Markdown list markers and link syntax, which the
//!   Mermaid renderer replaces with "Unsupported markdown" placeholders.
//! - In flowcharts, a Yes/No label that the exporter attached to the edge
//!   *into* a decision node is moved onto the decision's single unlabeled
//!   outgoing edge.
//!
//! Relocation only happens when every arrow line of the block parses as a
//! simple edge and the branch structure is unambiguous. Everything else is
//! passed through.

use crate::transform::{split_line_ending, Fence};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Sanitize every terminated Mermaid block in `text`.
///
/// # Example
///
/// ```
/// use docfix::transform::sanitize_mermaid;
///
/// let text = "```mermaid\nflowchart TD\n    A[\"- Step [one](x.md)\"] --> B\n```\n";
/// assert_eq!(
///     sanitize_mermaid(text),
///     "```mermaid\nflowchart TD\n    A[\"Step one\"] --> B\n```\n"
/// );
/// ```
pub fn sanitize_mermaid(text: &str) -> String {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < lines.len() {
        let (content, _) = split_line_ending(lines[i]);
        let Some(open) = Fence::parse(content) else {
            out.push_str(lines[i]);
            i += 1;
            continue;
        };

        let close = (i + 1..lines.len()).find(|&j| {
            let (content, _) = split_line_ending(lines[j]);
            Fence::parse(content).is_some_and(|fence| open.is_closed_by(&fence))
        });
        let Some(close) = close else {
            // Unterminated fence: nothing after it is reliably code or prose.
            for line in &lines[i..] {
                out.push_str(line);
            }
            break;
        };

        out.push_str(lines[i]);
        if is_mermaid_info(content) {
            out.push_str(&MermaidBlock::parse(&lines[i + 1..close]).sanitize());
        } else {
            for line in &lines[i + 1..close] {
                out.push_str(line);
            }
        }
        out.push_str(lines[close]);
        i = close + 1;
    }

    out
}

fn is_mermaid_info(fence_line: &str) -> bool {
    fence_line
        .trim_start()
        .trim_start_matches(['`', '~'])
        .trim()
        .to_ascii_lowercase()
        .starts_with("mermaid")
}

/// Lines of one fenced Mermaid diagram, without the fences.
struct MermaidBlock<'a> {
    lines: Vec<String>,
    endings: Vec<&'a str>,
}

impl<'a> MermaidBlock<'a> {
    fn parse(lines: &[&'a str]) -> Self {
        let (lines, endings) = lines
            .iter()
            .map(|&line| {
                let (content, ending) = split_line_ending(line);
                (content.to_string(), ending)
            })
            .unzip();
        Self { lines, endings }
    }

    fn sanitize(mut self) -> String {
        for line in &mut self.lines {
            *line = sanitize_node_labels(line);
        }
        if self.is_flowchart() {
            relocate_branch_labels(&mut self.lines);
        }
        self.lines
            .iter()
            .zip(&self.endings)
            .map(|(line, ending)| format!("{}{}", line, ending))
            .collect()
    }

    fn is_flowchart(&self) -> bool {
        self.lines
            .iter()
            .map(|line| line.trim())
            .find(|line| !line.is_empty() && !line.starts_with("%%"))
            .is_some_and(|line| line.starts_with("flowchart") || line.starts_with("graph"))
    }
}

// ============================================================================
// Label sanitization
// ============================================================================

static QUOTED_LABEL: OnceLock<Regex> = OnceLock::new();
static LINE_BREAK: OnceLock<Regex> = OnceLock::new();
static LIST_MARKER: OnceLock<Regex> = OnceLock::new();
static MARKDOWN_LINK: OnceLock<Regex> = OnceLock::new();

fn quoted_label_regex() -> &'static Regex {
    QUOTED_LABEL.get_or_init(|| {
        Regex::new(
            r#"(\[\[|\[\(|\(\[|\(\(|\{\{|\[|\(|\{)"([^"]*)"(\]\]|\)\]|\]\)|\)\)|\}\}|\]|\)|\})"#,
        )
        .expect("label regex should compile")
    })
}

fn line_break_regex() -> &'static Regex {
    LINE_BREAK.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("br regex should compile"))
}

fn list_marker_regex() -> &'static Regex {
    LIST_MARKER.get_or_init(|| {
        Regex::new(r"^(\s*)(?:(?:\d+\.|[-*+])\s+)+").expect("list marker regex should compile")
    })
}

fn markdown_link_regex() -> &'static Regex {
    MARKDOWN_LINK.get_or_init(|| {
        Regex::new(r"\[([^\[\]]*)\]\([^()]*\)").expect("markdown link regex should compile")
    })
}

/// Sanitize the text of every quoted node label on a diagram line.
pub fn sanitize_node_labels(line: &str) -> String {
    quoted_label_regex()
        .replace_all(line, |caps: &Captures| {
            format!("{}\"{}\"{}", &caps[1], sanitize_label(&caps[2]), &caps[3])
        })
        .into_owned()
}

/// Strip list markers and link syntax from label text.
///
/// Each `<br>`-separated part is handled on its own, so a multi-line label
/// keeps its line breaks.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last = 0;
    for br in line_break_regex().find_iter(label) {
        out.push_str(&sanitize_label_part(&label[last..br.start()]));
        out.push_str(br.as_str());
        last = br.end();
    }
    out.push_str(&sanitize_label_part(&label[last..]));
    out
}

fn sanitize_label_part(part: &str) -> String {
    let mut text = part.to_string();
    while markdown_link_regex().is_match(&text) {
        text = markdown_link_regex().replace_all(&text, "$1").into_owned();
    }
    list_marker_regex().replace(&text, "$1").into_owned()
}

// ============================================================================
// Branch label relocation
// ============================================================================

const NODE_ID: &str = r"[A-Za-z0-9_]+";
const NODE_SHAPE: &str = r#"(?:\[\[[^\]]*\]\]|\[\([^)]*\)\]|\(\[[^\]]*\]\)|\(\([^)]*\)\)|\{\{[^}]*\}\}|\["[^"]*"\]|\("[^"]*"\)|\{"[^"]*"\}|\[[^\]]*\]|\([^)]*\)|\{[^}]*\})"#;

static EDGE: OnceLock<Regex> = OnceLock::new();
static NODE_DECL: OnceLock<Regex> = OnceLock::new();
static ARROW_LIKE: OnceLock<Regex> = OnceLock::new();

fn edge_regex() -> &'static Regex {
    EDGE.get_or_init(|| {
        let pattern = format!(
            r"^(?P<indent>\s*)(?P<src>{id})(?P<src_shape>{shape})?\s*(?P<arrow><?[-.=]{{2,}}>?)\s*(?:\|(?P<label>[^|]*)\|\s*)?(?P<dst>{id})(?P<dst_shape>{shape})?\s*(?P<semi>;)?\s*$",
            id = NODE_ID,
            shape = NODE_SHAPE
        );
        Regex::new(&pattern).expect("edge regex should compile")
    })
}

fn node_decl_regex() -> &'static Regex {
    NODE_DECL.get_or_init(|| {
        let pattern = format!(
            r"^\s*(?P<id>{id})(?P<shape>{shape})\s*;?\s*$",
            id = NODE_ID,
            shape = NODE_SHAPE
        );
        Regex::new(&pattern).expect("node declaration regex should compile")
    })
}

fn arrow_like_regex() -> &'static Regex {
    ARROW_LIKE.get_or_init(|| Regex::new(r"--|==|-\.|~~~").expect("arrow regex should compile"))
}

const DIRECTIVES: &[&str] = &[
    "flowchart",
    "graph",
    "subgraph",
    "end",
    "direction",
    "classDef",
    "class",
    "style",
    "linkStyle",
    "click",
];

fn is_directive(trimmed: &str) -> bool {
    trimmed.starts_with("%%")
        || trimmed
            .split_whitespace()
            .next()
            .is_some_and(|word| DIRECTIVES.contains(&word))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
}

fn branch_polarity(label: Option<&str>) -> Option<Polarity> {
    let label = label?.trim().trim_matches('"').trim().to_lowercase();
    match label.as_str() {
        "yes" | "true" => Some(Polarity::Positive),
        "no" | "false" => Some(Polarity::Negative),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Edge {
    line_idx: usize,
    indent: String,
    src: String,
    src_shape: String,
    arrow: String,
    label: Option<String>,
    dst: String,
    dst_shape: String,
    semicolon: bool,
}

impl Edge {
    fn from_captures(line_idx: usize, caps: &Captures) -> Self {
        let text = |name: &str| caps.name(name).map_or("", |m| m.as_str()).to_string();
        Self {
            line_idx,
            indent: text("indent"),
            src: text("src"),
            src_shape: text("src_shape"),
            arrow: text("arrow"),
            label: caps.name("label").map(|m| m.as_str().to_string()),
            dst: text("dst"),
            dst_shape: text("dst_shape"),
            semicolon: caps.name("semi").is_some(),
        }
    }

    fn render(&self) -> String {
        let label = match &self.label {
            Some(label) => format!("|{}|", label),
            None => String::new(),
        };
        format!(
            "{}{}{} {}{} {}{}{}",
            self.indent,
            self.src,
            self.src_shape,
            self.arrow,
            label,
            self.dst,
            self.dst_shape,
            if self.semicolon { ";" } else { "" }
        )
    }
}

/// Edges and decision nodes of a flowchart, or `None` when any arrow line
/// fails to parse as a single edge.
struct Flowchart {
    edges: Vec<Edge>,
    decisions: HashSet<String>,
}

impl Flowchart {
    fn parse(lines: &[String]) -> Option<Self> {
        let mut edges = Vec::new();
        let mut decisions = HashSet::new();

        for (idx, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || is_directive(trimmed) {
                continue;
            }
            if let Some(caps) = node_decl_regex().captures(line) {
                if is_decision_shape(&caps["shape"]) {
                    decisions.insert(caps["id"].to_string());
                }
                continue;
            }
            if let Some(caps) = edge_regex().captures(line) {
                let edge = Edge::from_captures(idx, &caps);
                if is_decision_shape(&edge.src_shape) {
                    decisions.insert(edge.src.clone());
                }
                if is_decision_shape(&edge.dst_shape) {
                    decisions.insert(edge.dst.clone());
                }
                edges.push(edge);
                continue;
            }
            if arrow_like_regex().is_match(trimmed) {
                tracing::debug!(line = %trimmed, "unparsed mermaid edge, skipping branch relocation");
                return None;
            }
        }

        Some(Self { edges, decisions })
    }
}

/// A diamond (`{...}`, not the `{{...}}` hexagon) or a label ending in `?`.
fn is_decision_shape(shape: &str) -> bool {
    if shape.is_empty() {
        return false;
    }
    if shape.starts_with('{') && !shape.starts_with("{{") {
        return true;
    }
    let inner = shape
        .trim_start_matches(['[', '(', '{'])
        .trim_end_matches([']', ')', '}'])
        .trim_matches('"')
        .trim();
    inner.ends_with('?')
}

/// Move orphaned Yes/No labels from a decision's incoming edge onto its
/// single unlabeled outgoing edge. Only the touched lines are re-rendered.
fn relocate_branch_labels(lines: &mut [String]) {
    let Some(Flowchart {
        mut edges,
        decisions,
    }) = Flowchart::parse(lines)
    else {
        return;
    };

    let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.src.clone()).or_default().push(idx);
    }

    let mut touched = Vec::new();
    for idx in 0..edges.len() {
        let Some(polarity) = branch_polarity(edges[idx].label.as_deref()) else {
            continue;
        };
        let (src, dst) = (&edges[idx].src, &edges[idx].dst);
        if src == dst || !decisions.contains(dst) {
            continue;
        }
        if outgoing.get(src).map_or(0, Vec::len) != 1 {
            continue;
        }
        let branches = match outgoing.get(dst) {
            Some(branches) if branches.len() >= 2 => branches,
            _ => continue,
        };
        let unlabeled: Vec<usize> = branches
            .iter()
            .copied()
            .filter(|&b| edges[b].label.is_none())
            .collect();
        if unlabeled.len() != 1 {
            continue;
        }
        let same_polarity_taken = branches
            .iter()
            .any(|&b| branch_polarity(edges[b].label.as_deref()) == Some(polarity));
        if same_polarity_taken {
            continue;
        }

        let target = unlabeled[0];
        tracing::debug!(
            from = %edges[idx].src,
            decision = %edges[target].src,
            to = %edges[target].dst,
            "relocating branch label"
        );
        edges[target].label = edges[idx].label.take();
        touched.push(idx);
        touched.push(target);
    }

    for idx in touched {
        lines[edges[idx].line_idx] = edges[idx].render();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(body: &str) -> String {
        format!("# Doc\n\n```mermaid\n{}```\n", body)
    }

    #[test]
    fn test_list_marker_stripped_from_label() {
        assert_eq!(sanitize_label("- Install"), "Install");
        assert_eq!(sanitize_label("1. First<br>2. Second"), "First<br>Second");
        assert_eq!(sanitize_label("- - nested"), "nested");
    }

    #[test]
    fn test_link_reduced_to_text() {
        assert_eq!(
            sanitize_label("See [config](https://example.com/c.md) now"),
            "See config now"
        );
        assert_eq!(sanitize_label("[[inner](a)](b)"), "inner");
    }

    #[test]
    fn test_plain_labels_untouched() {
        assert_eq!(sanitize_label("Load -1 items + more"), "Load -1 items + more");
        assert_eq!(sanitize_label("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_only_label_text_is_sanitized() {
        let line = r#"    A["- [Start](s.md)"] -->|"- keep"| B("* Next")"#;
        assert_eq!(
            sanitize_node_labels(line),
            r#"    A["Start"] -->|"- keep"| B("Next")"#
        );
    }

    #[test]
    fn test_non_mermaid_blocks_untouched() {
        let input = "```text\nA[\"- item\"]\n```\n";
        assert_eq!(sanitize_mermaid(input), input);
    }

    #[test]
    fn test_unterminated_block_untouched() {
        let input = "```mermaid\nflowchart TD\n    A[\"- item\"] --> B\n";
        assert_eq!(sanitize_mermaid(input), input);
    }

    #[test]
    fn test_orphan_no_label_moved_to_unlabeled_branch() {
        let input = block(
            "flowchart TD\n    A[\"Start\"] --> X\n    X -->|\"No\"| D\n    D{\"cond\"}\n    D -->|\"Yes\"| E\n    D --> F\n",
        );
        let expected = block(
            "flowchart TD\n    A[\"Start\"] --> X\n    X --> D\n    D{\"cond\"}\n    D -->|\"Yes\"| E\n    D -->|\"No\"| F\n",
        );
        assert_eq!(sanitize_mermaid(&input), expected);
    }

    #[test]
    fn test_two_unlabeled_branches_left_unchanged() {
        let input = block(
            "flowchart TD\n    X -->|\"No\"| D\n    D{\"cond\"}\n    D --> E\n    D --> F\n",
        );
        assert_eq!(sanitize_mermaid(&input), input);
    }

    #[test]
    fn test_non_decision_node_left_unchanged() {
        let input = block("flowchart TD\n    X -->|\"No\"| D\n    D[\"step\"]\n    D -->|\"Yes\"| E\n    D --> F\n");
        assert_eq!(sanitize_mermaid(&input), input);
    }

    #[test]
    fn test_question_label_counts_as_decision() {
        let input = block("graph LR\n    X -->|No| D[\"Valid?\"]\n    D -->|Yes| E\n    D --> F\n");
        let expected = block("graph LR\n    X --> D[\"Valid?\"]\n    D -->|Yes| E\n    D -->|No| F\n");
        assert_eq!(sanitize_mermaid(&input), expected);
    }

    #[test]
    fn test_same_polarity_already_present_left_unchanged() {
        let input = block("flowchart TD\n    X -->|\"Yes\"| D{\"ok?\"}\n    D -->|\"Yes\"| E\n    D --> F\n");
        assert_eq!(sanitize_mermaid(&input), input);
    }

    #[test]
    fn test_source_with_several_edges_left_unchanged() {
        let input = block("flowchart TD\n    X -->|\"No\"| D{\"ok?\"}\n    X --> G\n    D -->|\"Yes\"| E\n    D --> F\n");
        assert_eq!(sanitize_mermaid(&input), input);
    }

    #[test]
    fn test_unparsed_arrow_line_disables_relocation() {
        let input = block("flowchart TD\n    X -->|\"No\"| D{\"ok?\"}\n    D -->|\"Yes\"| E --> G\n    D --> F\n");
        assert_eq!(sanitize_mermaid(&input), input);
    }

    #[test]
    fn test_sequence_diagrams_only_get_label_sanitization() {
        let input = block("sequenceDiagram\n    A->>B: hello\n");
        assert_eq!(sanitize_mermaid(&input), input);
    }

    #[test]
    fn test_relocation_is_idempotent() {
        let input = block(
            "flowchart TD\n    X -->|\"No\"| D\n    D{\"cond\"}\n    D -->|\"Yes\"| E\n    D --> F\n",
        );
        let once = sanitize_mermaid(&input);
        assert_ne!(once, input);
        assert_eq!(sanitize_mermaid(&once), once);
    }

    #[test]
    fn test_directive_detection() {
        assert!(is_directive("subgraph Build"));
        assert!(is_directive("end"));
        assert!(is_directive("%% comment --> here"));
        assert!(is_directive("style A stroke-dasharray: 5 5"));
        assert!(!is_directive("endpoint --> D"));
    }

    #[test]
    fn test_decision_shape_detection() {
        assert!(is_decision_shape("{cond}"));
        assert!(is_decision_shape("{\"cond\"}"));
        assert!(!is_decision_shape("{{hex}}"));
        assert!(is_decision_shape("[\"Ready?\"]"));
        assert!(!is_decision_shape("[step]"));
        assert!(!is_decision_shape(""));
    }
}
