//! File-backed template manager

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use stencil::template::manager::{FileSource, TemplateError, TemplateManager};
use stencil::{Bindings, CompileOptions, Value};

fn write_at(path: &Path, content: &str, modified: SystemTime) {
    fs::write(path, content).expect("write template");
    File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(modified))
        .expect("set modification time");
}

#[test]
fn test_recompiles_when_file_is_newer() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("page.tpl");
    let start = SystemTime::now() - Duration::from_secs(3600);
    write_at(&path, "v1 {echo n}", start);

    let manager = TemplateManager::new(FileSource::new(dir.path()));
    let bindings = Bindings::new().with("n", 1);
    assert_eq!(manager.render("page.tpl", &bindings).unwrap(), "v1 1");
    let cached = manager.compile("page.tpl").unwrap();

    // Same stamp: the cached compile is reused even though the content changed.
    write_at(&path, "stale", start);
    assert!(Arc::ptr_eq(&cached, &manager.compile("page.tpl").unwrap()));

    write_at(&path, "v2 {echo n}", start + Duration::from_secs(60));
    assert_eq!(manager.render("page.tpl", &bindings).unwrap(), "v2 1");
}

#[test]
fn test_includes_resolve_in_subdirectories() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::create_dir(dir.path().join("parts")).expect("create dir");
    fs::write(
        dir.path().join("page.tpl"),
        "{for items v}{include \"parts/item.tpl\"}{endfor}",
    )
    .expect("write page");
    fs::write(dir.path().join("parts/item.tpl"), "<{echo v}>").expect("write part");

    let manager = TemplateManager::new(FileSource::new(dir.path()));
    let bindings = Bindings::new().with("items", vec!["a", "b"]);
    assert_eq!(manager.render("page.tpl", &bindings).unwrap(), "<a><b>");
}

#[test]
fn test_options_and_functions_apply_to_all_templates() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("page.tpl"), "[[twice n]]").expect("write page");

    let mut manager = TemplateManager::new(FileSource::new(dir.path()))
        .with_options(CompileOptions::default().with_delimiters("[[", "]]"));
    manager.register_function("twice", |args| args[0].arithmetic("*", &Value::Int(2)));

    let bindings = Bindings::new().with("n", 21);
    assert_eq!(manager.render("page.tpl", &bindings).unwrap(), "42");
}

#[test]
fn test_errors_name_the_template() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("bad.tpl"), "{if x}").expect("write template");
    let manager = TemplateManager::new(FileSource::new(dir.path()));

    let err = manager.render("bad.tpl", &Bindings::new()).unwrap_err();
    assert!(matches!(err, TemplateError::Compile { ref name, .. } if name == "bad.tpl"));
    assert!(err.to_string().starts_with("failed to compile template `bad.tpl`"));

    let err = manager.render("missing.tpl", &Bindings::new()).unwrap_err();
    assert_eq!(err.to_string(), "template `missing.tpl` not found");

    let err = manager.render("../bad.tpl", &Bindings::new()).unwrap_err();
    assert!(matches!(err, TemplateError::InvalidName(_)));
}
