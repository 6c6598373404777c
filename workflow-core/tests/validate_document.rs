//! Whole-document scans of hand-edited documents.

mod helpers;

use helpers::*;
use workflow_core::validate::{check_publish, validate_document};
use workflow_core::EditorConfig;

#[test]
fn broken_document_reports_each_structural_rule() {
    let mut registry = registry(load(BROKEN_STRUCTURE));
    let issues = validate_document(&mut registry);
    let found = codes(&issues);

    for code in ["S003", "S006", "S008", "S009"] {
        assert!(found.contains(&code), "missing {} in {:?}", code, found);
    }
    assert!(!found.contains(&"S001"));
    assert!(!found.contains(&"S002"));
}

#[test]
fn misplaced_node_message() {
    let mut registry = registry(load(BROKEN_STRUCTURE));
    let issues = validate_document(&mut registry);
    let s009 = issues.iter().find(|i| i.code == "S009").unwrap();
    insta::assert_snapshot!(
        s009.to_string(),
        @"[S009:InvalidValue] graph: Node 'orphan' is placed in 'a', which is not a container (node 'orphan')"
    );
}

#[test]
fn structural_findings_always_block_publish() {
    let mut registry = registry(load(BROKEN_STRUCTURE));
    let verdict = check_publish(&mut registry, &EditorConfig::default());
    assert!(!verdict.allowed);
    assert!(verdict.blocking.iter().all(|i| i.code.starts_with('S')));
    assert!(verdict.blocking.iter().any(|i| i.code == "S006"));
}

#[test]
fn fixtures_without_structural_problems() {
    for json in [ITERATOR_PIPELINE, JUDGE_FLOW] {
        let mut registry = registry(load(json));
        let issues = validate_document(&mut registry);
        assert!(issues.iter().all(|i| !i.code.starts_with('S')), "{:?}", codes(&issues));
    }
}
