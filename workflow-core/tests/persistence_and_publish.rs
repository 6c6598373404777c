//! Save/load through an app store, draft-vs-published diffs and the
//! publish gate.

mod helpers;

use helpers::*;
use workflow_core::document::*;
use workflow_core::external::{AppStore, ConfigDiff, MemoryAppStore};
use workflow_core::value::ValueType;
use workflow_core::{EditError, Editor, EditorConfig};

#[test]
fn saved_apps_load_back_unchanged() {
    let mut store = MemoryAppStore::new();
    for (app, json) in [("iter", ITERATOR_PIPELINE), ("judge", JUDGE_FLOW), ("broken", BROKEN_STRUCTURE)] {
        store.save_app(app, &load(json)).unwrap();
    }
    for (app, json) in [("iter", ITERATOR_PIPELINE), ("judge", JUDGE_FLOW), ("broken", BROKEN_STRUCTURE)] {
        assert_eq!(store.load_app(app).unwrap(), load(json), "{}", app);
    }
}

#[test]
fn loading_unknown_app_fails() {
    let store = MemoryAppStore::new();
    let err = store.load_app("missing").unwrap_err();
    assert!(matches!(err, EditError::UnknownApp(id) if id == "missing"));
}

#[test]
fn session_edits_survive_a_save() {
    let mut store = MemoryAppStore::new();
    let mut editor = editor(JUDGE_FLOW);
    editor.set_label("welcome", "Greeting").unwrap();
    store.save_app("judge", editor.document()).unwrap();

    let reopened = Editor::new(store.load_app("judge").unwrap(), EditorConfig::default());
    assert_eq!(reopened.document().node("welcome").map(|n| n.label()), Some("Greeting"));
}

#[test]
fn malformed_document_is_rejected() {
    let err = Editor::load("{\"nodes\": 3}", EditorConfig::default()).err();
    assert!(matches!(err, Some(EditError::Serialization(_))));
}

#[test]
fn diff_against_published() {
    let published = load(JUDGE_FLOW);
    let mut editor = editor(JUDGE_FLOW);
    assert!(ConfigDiff::between(&published, editor.document()).is_empty());

    editor.set_label("welcome", "Greeting").unwrap();
    editor.remove_branch("judge", "adult").unwrap();
    editor.insert_node(NodeType::Output, "extra", ScopeId::Root).unwrap();

    let diff = ConfigDiff::between(&published, editor.document());
    assert_eq!(diff.added_nodes, ["extra"]);
    assert!(diff.removed_nodes.is_empty());
    assert_eq!(diff.changed_nodes, ["judge", "welcome"]);
    assert!(diff.added_edges.is_empty());
    assert_eq!(diff.removed_edges, ["judge[judge_adult] -> welcome"]);
    assert!(!diff.global_config_changed);
}

#[test]
fn clean_fixture_is_publishable() {
    let mut editor = editor(JUDGE_FLOW);
    let verdict = editor.check_publish();
    assert!(verdict.allowed, "{:?}", verdict.blocking);
}

#[test]
fn removed_target_blocks_publish() {
    let mut editor = editor(JUDGE_FLOW);
    editor
        .declare_outputs("start", vec![VariableDecl::new("name", ValueType::String)])
        .unwrap();

    let verdict = editor.check_publish();
    assert!(!verdict.allowed);
    assert!(verdict
        .blocking
        .iter()
        .any(|i| i.code == "R001" && i.node_id.as_deref() == Some("judge")));
}

#[test]
fn type_mismatch_blocks_only_when_strict() {
    let retyped = || {
        vec![
            VariableDecl::new("name", ValueType::String),
            VariableDecl::new("age", ValueType::String),
        ]
    };

    let mut lenient = editor(JUDGE_FLOW);
    lenient.declare_outputs("start", retyped()).unwrap();
    let verdict = lenient.check_publish();
    assert!(verdict.allowed);
    assert!(verdict.warnings.iter().any(|i| i.code == "R002"));

    let strict = EditorConfig {
        strict_publish: true,
        ..EditorConfig::default()
    };
    let mut strict = Editor::new(load(JUDGE_FLOW), strict);
    strict.declare_outputs("start", retyped()).unwrap();
    assert!(!strict.check_publish().allowed);
}
