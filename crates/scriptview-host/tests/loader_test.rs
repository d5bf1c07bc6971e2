//! Loader cache tests: resolution idempotence and hot reload

use scriptview_host::{HostError, RequirePolicy, ScriptEnvironment, ScriptLoader};
use serde_json::json;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn touch_later(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn test_resolution_is_cached() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("util.js"), "").unwrap();
    let loader = ScriptLoader::new([dir.path()], false).unwrap();
    let cwd = loader.search_paths()[0].clone();

    let first = loader.resolve(&cwd, "util").unwrap();
    let probes = loader.stats().probes;
    let second = loader.resolve(&cwd, "util").unwrap();

    assert_eq!(first, second);
    assert_eq!(loader.stats().probes, probes);
    assert_eq!(loader.stats().resolve_hits, 1);
}

#[test]
fn test_search_roots_in_order() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    std::fs::write(first.path().join("shared.js"), "").unwrap();
    std::fs::write(second.path().join("shared.js"), "").unwrap();
    std::fs::write(second.path().join("only.js"), "").unwrap();

    let loader = ScriptLoader::new([first.path(), second.path()], false).unwrap();
    let cwd = first.path();
    assert!(loader.resolve(cwd, "shared").unwrap().starts_with(first.path()));
    assert!(loader.resolve(cwd, "only").unwrap().starts_with(second.path()));
}

#[test]
fn test_not_found_names_id_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ScriptLoader::new([dir.path()], false).unwrap();
    let err = loader.resolve(dir.path(), "ghost").unwrap_err();
    assert!(matches!(err, HostError::ModuleNotFound { .. }));
    let message = err.to_string();
    assert!(message.contains("'ghost'"), "{message}");
    assert!(message.contains(&dir.path().display().to_string()), "{message}");
}

#[test]
fn test_factory_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("m.js");
    std::fs::write(&path, "exports.x = 1;").unwrap();
    let loader = ScriptLoader::new([dir.path()], false).unwrap();
    let source = loader.load_source(&path).unwrap();
    assert!(source.starts_with("(function (exports, require, module, __filename, __dirname) {"));
    assert!(source.contains("exports.x = 1;"));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ScriptLoader::new([dir.path()], true).unwrap();
    assert!(matches!(
        loader.load(&dir.path().join("absent.js")),
        Err(HostError::Io { .. })
    ));
}

#[test]
fn test_development_reloads_changed_sources() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("m.js");
    std::fs::write(&path, "// one").unwrap();
    let loader = ScriptLoader::new([dir.path()], true).unwrap();

    assert!(loader.load_source(&path).unwrap().contains("// one"));
    assert!(loader.load_source(&path).unwrap().contains("// one"));
    assert_eq!(loader.stats().source_reads, 1);

    std::fs::write(&path, "// two").unwrap();
    touch_later(&path, 5);
    assert!(loader.load_source(&path).unwrap().contains("// two"));
    assert_eq!(loader.stats().source_reads, 2);
}

#[test]
fn test_production_keeps_first_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("m.js");
    std::fs::write(&path, "// one").unwrap();
    let loader = ScriptLoader::new([dir.path()], false).unwrap();
    loader.load_source(&path).unwrap();

    std::fs::write(&path, "// two").unwrap();
    touch_later(&path, 5);
    assert!(loader.load_source(&path).unwrap().contains("// one"));

    assert!(loader.invalidate(&path));
    assert!(loader.load_source(&path).unwrap().contains("// two"));
}

#[test]
fn test_hot_reload_through_require() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeting.js");
    std::fs::write(&path, "module.exports = 'hello';").unwrap();

    let dev = Arc::new(ScriptLoader::new([dir.path()], true).unwrap());
    let prod = Arc::new(ScriptLoader::new([dir.path()], false).unwrap());
    let dev_env = ScriptEnvironment::new(Arc::clone(&dev), RequirePolicy::Fresh).unwrap();
    let prod_env = ScriptEnvironment::new(Arc::clone(&prod), RequirePolicy::Cached).unwrap();
    assert_eq!(dev_env.run("require('greeting')").unwrap(), json!("hello"));
    assert_eq!(prod_env.run("require('greeting')").unwrap(), json!("hello"));

    std::fs::write(&path, "module.exports = 'bonjour';").unwrap();
    touch_later(&path, 5);

    assert_eq!(dev_env.run("require('greeting')").unwrap(), json!("bonjour"));
    let fresh_prod_env = ScriptEnvironment::new(prod, RequirePolicy::Cached).unwrap();
    assert_eq!(fresh_prod_env.run("require('greeting')").unwrap(), json!("hello"));
}
