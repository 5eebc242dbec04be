use std::path::PathBuf;

use chrono::TimeZone;
use node_forge_codegen::migrate::{self, report, tree};
use node_forge_codegen::schema::{self, load_default_registry};

fn fixture() -> tree::LogicDoc {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/cases/logic/legacy.json");
    tree::load_logic_doc_from_path(&path).unwrap_or_else(|e| panic!("failed to load {}: {e:#}", path.display()))
}

#[test]
fn legacy_tree_migrates_around_failures() {
    let registry = load_default_registry().unwrap();
    let mut doc = fixture();
    let outcome = migrate::migrate_doc(&mut doc, &registry);

    let replaced: Vec<_> = outcome.replaced.iter().map(|(old, _)| old.as_str()).collect();
    assert_eq!(replaced, ["Gamepad", "Show Mouse"]);
    let kinds: Vec<_> = outcome.errors.iter().map(|e| (e.node_id(), e.kind())).collect();
    assert_eq!(kinds, [("Rigid Body", "misc."), ("Teleport", "unregistered")]);

    let t = &doc.trees[0];
    let pad = t.node("Gamepad.001").unwrap();
    assert_eq!(pad.node_type, "LNMergedGamepadNode");
    assert_eq!(pad.location, [120.0, -40.0]);
    assert_eq!(pad.properties["property1"], "square");
    assert_eq!(pad.inputs[0].default, 2);
    assert_eq!(t.input_link("Print", 0).unwrap().from_node, "Gamepad.001");

    let cursor = t.node("Show Mouse.001").unwrap();
    assert_eq!(cursor.node_type, "LNSetCursorStateNode");
    assert_eq!(cursor.inputs[1].default, false);
    assert_eq!(t.input_link("Show Mouse.001", 0).unwrap().from_node, "Update");

    // Failed nodes are kept as they were
    assert_eq!(t.node("Rigid Body").unwrap().version, 1);
    assert_eq!(t.input_link("Rigid Body", 0).unwrap().from_node, "Update");

    let order: Vec<_> = t.nodes.keys().map(String::as_str).collect();
    assert_eq!(order, ["Update", "Gamepad.001", "Show Mouse.001", "Rigid Body", "Print", "Teleport"]);
}

#[test]
fn migrated_links_pass_validation() {
    let registry = load_default_registry().unwrap();
    let mut doc = fixture();
    migrate::migrate_doc(&mut doc, &registry);
    let t = &doc.trees[0];
    schema::validate_tree_against(t, &registry).unwrap();
}

#[test]
fn failures_are_reported_to_a_timestamped_file() {
    let registry = load_default_registry().unwrap();
    let mut doc = fixture();
    let outcome = migrate::migrate_doc(&mut doc, &registry);

    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("logic_migration_report");
    std::fs::create_dir_all(&dir).unwrap();
    let at = chrono::Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().unwrap();
    let path = report::write_report(&dir, &outcome.errors, at).unwrap().expect("report written");
    assert_eq!(path.file_name().unwrap().to_string_lossy(), report::report_file_name(&at));

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("A node whose class doesn't exist was found in node tree \"PlayerLogic\""));
    assert!(text.contains("LNAddRigidBodyNode"));
    assert!(text.contains("(node \"Teleport\", kind: unregistered)"));
}

#[test]
fn migrated_document_round_trips() {
    let registry = load_default_registry().unwrap();
    let mut doc = fixture();
    migrate::migrate_doc(&mut doc, &registry);
    let text = serde_json::to_string(&doc).unwrap();
    let back = tree::load_logic_doc_from_str(&text).unwrap();
    assert_eq!(back, doc);

    // Nothing left to update on a second pass except the broken nodes
    let mut again = back;
    let outcome = migrate::migrate_doc(&mut again, &registry);
    assert!(outcome.replaced.is_empty());
    assert_eq!(outcome.errors.len(), 2);
}
