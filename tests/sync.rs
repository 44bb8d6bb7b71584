//! Filesystem knowledge sources and sync runs.

mod common;

use std::fs;
use std::path::Path;

use concierge_harness::config::SourceConfig;
use concierge_harness::sync::{run_sync, FilesystemJsonSource, KnowledgeSource};
use concierge_harness_core::store::EntryFilter;

use common::*;

fn source_config(root: &Path) -> SourceConfig {
    SourceConfig {
        root: root.to_path_buf(),
        include_globs: vec!["**/*.json".to_string()],
        exclude_globs: vec![],
        follow_symlinks: false,
        category_id: Some("general".to_string()),
        language: None,
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn scan_skips_default_excludes_and_sorts() {
    let tmp = tempfile::TempDir::new().unwrap();
    let root = tmp.path().join("faq");
    write(&root.join("b.json"), "[]");
    write(&root.join("a/horario.json"), "[]");
    write(&root.join("node_modules/pkg/x.json"), "[]");
    write(&root.join("notes.md"), "# not json");

    let source = FilesystemJsonSource::new("faq", source_config(&root));
    let files: Vec<String> = source
        .scan()
        .unwrap()
        .iter()
        .map(|p| p.strip_prefix(&root).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(files, vec!["a/horario.json", "b.json"]);
}

#[tokio::test]
async fn load_applies_source_defaults() {
    let tmp = tempfile::TempDir::new().unwrap();
    let root = tmp.path().join("faq");
    write(
        &root.join("faq.json"),
        r#"[
            {"title": "Horario", "content": "Abrimos a las 13:00."},
            {"title": "Terraza", "content": "Terraza de 40 plazas.", "categoryId": "espacios", "language": "en"}
        ]"#,
    );

    let source = FilesystemJsonSource::new("faq", source_config(&root));
    let entries = source.load().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].category_id.as_deref(), Some("general"));
    assert_eq!(entries[0].language, None);
    assert_eq!(entries[1].category_id.as_deref(), Some("espacios"));
    assert_eq!(entries[1].language.as_deref(), Some("en"));
}

#[tokio::test]
async fn failing_source_does_not_stop_the_run() {
    let env = setup(ScriptedChat::new("", vec![])).await;
    let root = env.tmp.path().join("faq");
    write(
        &root.join("faq.json"),
        r#"[{"title": "Parking", "content": "Aparcamiento gratuito."}]"#,
    );

    let sources: Vec<Box<dyn KnowledgeSource>> = vec![
        Box::new(FilesystemJsonSource::new(
            "missing",
            source_config(&env.tmp.path().join("does-not-exist")),
        )),
        Box::new(FilesystemJsonSource::new("faq", source_config(&root))),
    ];
    let report = run_sync(&env.app.kb, &sources).await;

    assert_eq!(report.phases.len(), 2);
    assert_eq!(report.phases[0].phase, "kb:missing");
    assert_eq!(report.phases[0].errors.len(), 1);
    assert_eq!(report.phases[1].created, 1);
    assert!(report.phases[1].errors.is_empty());
    assert_eq!(report.kb_entries, 1);
    assert!(!report.is_clean());
    assert!(report.errors[0].starts_with("[kb:missing]"));

    let stored = env
        .app
        .kb
        .list(&EntryFilter {
            source: Some("faq".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].category_id.as_deref(), Some("general"));
}

#[tokio::test]
async fn malformed_file_is_reported_per_source() {
    let env = setup(ScriptedChat::new("", vec![])).await;
    let root = env.tmp.path().join("faq");
    write(&root.join("broken.json"), r#"{"title": "not an array"}"#);

    let sources: Vec<Box<dyn KnowledgeSource>> =
        vec![Box::new(FilesystemJsonSource::new("faq", source_config(&root)))];
    let report = run_sync(&env.app.kb, &sources).await;
    assert_eq!(report.phases[0].created, 0);
    assert!(report.phases[0].errors[0].contains("not a JSON array of entries"));
}
