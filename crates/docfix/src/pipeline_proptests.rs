//! Property-based tests for pipeline idempotence
//!
//! Documents are assembled from lines that exercise every pass, in random
//! order, so fences open and close in arbitrary places.

use super::*;
use crate::transform::artifacts::LINK_COPIED;
use crate::transform::{process_text, strip_artifacts};
use proptest::prelude::*;

const README_FIXTURE: &str = "# Guide\n\n## Networking Configuration\n\n## WSL.exe Issues\n";

fn line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("# Title".to_string()),
        Just("## Networking Configuration".to_string()),
        Just("## Setup Link copied!".to_string()),
        Just("Link copied!".to_string()),
        Just("Ask Devin about this repository".to_string()),
        Just("See [Section]() for details.".to_string()),
        Just("Read [the guide](Networking%20Section).".to_string()),
        Just("[code](/acme/widget/blob/abc1234/src/lib.rs)".to_string()),
        Just("[ref]: https://github.com/acme/widget/blob/0123456789abcdef/README.md".to_string()),
        Just("- [Intro](intro.md)".to_string()),
        Just("- [Src](/acme/widget/".to_string()),
        Just("src/lib.rs)".to_string()),
        Just("- [Long](long-".to_string()),
        Just("page.md)".to_string()),
        Just("```python".to_string()),
        Just("handlers[\"x\"](".to_string()),
        Just("    arg,".to_string()),
        Just(")".to_string()),
        Just("```mermaid".to_string()),
        Just("```rust".to_string()),
        Just("```".to_string()),
        Just("flowchart TD".to_string()),
        Just("    A[\"- first<br>[docs](x.md)\"] --> B{\"Valid?\"}".to_string()),
        Just("    B -->|Yes| C[Done]".to_string()),
        Just("    B --> D[Retry]".to_string()),
        Just("    X[Check] -->|No| B".to_string()),
        Just(String::new()),
        "[a-z ]{0,20}",
    ]
}

fn document_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(line_strategy(), 0..24).prop_map(|lines| lines.join("\n"))
}

proptest! {
    #[test]
    fn prop_per_file_passes_idempotent(text in document_strategy(), in_readme in any::<bool>()) {
        let anchors = AnchorTable::from_readme(README_FIXTURE);
        let ctx = LinkContext::new(&anchors).in_readme(in_readme);

        let once = process_text(&text, &ctx);
        let twice = process_text(&once, &ctx);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_readme_run_is_idempotent(readme in document_strategy()) {
        let documents = vec![
            Document::new("README.md", readme),
            Document::new("intro.md", "# Intro\n"),
            Document::new("long-page.md", "# Long\n"),
        ];
        let paths: BTreeSet<PathBuf> = documents.iter().map(|doc| doc.path.clone()).collect();
        let first = transform_documents(documents, &paths);

        let renamed: Vec<Document> = first
            .documents
            .iter()
            .map(|doc| Document::new(first.output_path(doc), doc.text.clone()))
            .collect();
        let renamed_paths: BTreeSet<PathBuf> = renamed.iter().map(|doc| doc.path.clone()).collect();
        let second = transform_documents(renamed, &renamed_paths);

        prop_assert!(second.renames.is_empty());
        for (once, twice) in first.documents.iter().zip(&second.documents) {
            prop_assert_eq!(&once.text, &twice.text);
        }
    }

    #[test]
    fn prop_artifacts_never_survive(text in "(Link copied!|Link cop|ied!|[a-z\n ]{0,5}){0,12}") {
        let stripped = strip_artifacts(&text);
        prop_assert!(!stripped.contains(LINK_COPIED));
    }

    #[test]
    fn prop_numbering_is_stable(names in prop::collection::btree_set("[a-z]{3,8}", 1..15)) {
        let readme: String = names.iter().map(|name| format!("- [{name}]({name}.md)\n")).collect();
        let mut documents = vec![Document::new("README.md", readme)];
        documents.extend(names.iter().map(|name| Document::new(format!("{name}.md"), "# Page\n")));
        let paths: BTreeSet<PathBuf> = documents.iter().map(|doc| doc.path.clone()).collect();

        let first = transform_documents(documents, &paths);
        prop_assert!(first.conflicts.is_empty());

        let renamed: Vec<Document> = first
            .documents
            .iter()
            .map(|doc| Document::new(first.output_path(doc), doc.text.clone()))
            .collect();
        let renamed_paths: BTreeSet<PathBuf> = renamed.iter().map(|doc| doc.path.clone()).collect();

        let second = transform_documents(renamed, &renamed_paths);
        prop_assert!(second.renames.is_empty());
        prop_assert!(second.documents.iter().all(|doc| doc.text == doc.original));
    }
}
