use std::collections::HashMap;
use std::path::PathBuf;

use pixvault_config::{ConfigLoadError, ConfigLoader, ConfigSource};
use tempfile::tempdir;

fn loader(base: &std::path::Path, vars: &[(&str, &str)]) -> ConfigLoader {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ConfigLoader::new()
        .with_base_dir(base)
        .with_env(move |key| vars.get(key).cloned())
}

#[test]
fn defaults_when_nothing_is_configured() {
    let dir = tempdir().unwrap();
    let load = loader(dir.path(), &[]).load().unwrap();

    assert_eq!(load.source, ConfigSource::Default);
    assert!(load.config.library.roots.is_empty());
    assert!(load.config.database.url.is_none());
    assert!(load.warnings.iter().any(|w| w.contains("no library roots")));
    assert!(load.warnings.iter().any(|w| w.contains("in-memory")));
}

#[test]
fn candidate_file_is_discovered() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::write(
        dir.path().join("config/pixvault.toml"),
        "[pipeline.scan]\nfile_workers = 2\n",
    )
    .unwrap();

    let load = loader(dir.path(), &[]).load().unwrap();
    assert_eq!(load.source, ConfigSource::File(dir.path().join("config/pixvault.toml")));
    assert_eq!(load.config.pipeline.scan.file_workers, 2);
}

#[test]
fn explicit_path_beats_inline_json_and_candidates() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("pixvault.toml"), "[pipeline.scan]\nfile_workers = 2\n").unwrap();
    std::fs::write(
        dir.path().join("custom.json"),
        r#"{"pipeline": {"scan": {"file_workers": 7}}}"#,
    )
    .unwrap();

    let load = loader(
        dir.path(),
        &[
            ("PIXVAULT_CONFIG_PATH", "custom.json"),
            ("PIXVAULT_CONFIG_JSON", r#"{"pipeline": {"scan": {"file_workers": 9}}}"#),
        ],
    )
    .load()
    .unwrap();
    assert_eq!(load.source, ConfigSource::EnvPath(dir.path().join("custom.json")));
    assert_eq!(load.config.pipeline.scan.file_workers, 7);

    let inline = loader(
        dir.path(),
        &[("PIXVAULT_CONFIG_JSON", r#"{"pipeline": {"scan": {"file_workers": 9}}}"#)],
    )
    .load()
    .unwrap();
    assert_eq!(inline.source, ConfigSource::EnvInline);
    assert_eq!(inline.config.pipeline.scan.file_workers, 9);
}

#[test]
fn environment_overrides_apply_on_top() {
    let dir = tempdir().unwrap();
    let photos = dir.path().join("photos");
    std::fs::create_dir_all(&photos).unwrap();
    std::fs::write(
        dir.path().join("pixvault.toml"),
        "[database]\nurl = \"postgres://file/db\"\n[logging]\nfilter = \"warn\"\n",
    )
    .unwrap();

    let roots = std::env::join_paths([photos.clone(), PathBuf::from("videos")]).unwrap();
    let load = loader(
        dir.path(),
        &[
            ("DATABASE_URL", "postgres://env/db"),
            ("PIXVAULT_ROOTS", roots.to_str().unwrap()),
            ("PIXVAULT_LOG", "debug"),
        ],
    )
    .load()
    .unwrap();

    assert_eq!(load.config.database.url.as_deref(), Some("postgres://env/db"));
    assert_eq!(load.config.logging.filter, "debug");
    let paths: Vec<_> = load.config.library.roots.iter().map(|r| r.path.clone()).collect();
    assert_eq!(paths, vec![photos, dir.path().join("videos")]);
    assert!(load.warnings.iter().any(|w| w.contains("videos")));
}

#[test]
fn database_url_can_come_from_a_secret_file() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("db-url"), "postgres://secret/db\n").unwrap();

    let load = loader(dir.path(), &[("DATABASE_URL_FILE", "db-url")]).load().unwrap();
    assert_eq!(load.config.database.url.as_deref(), Some("postgres://secret/db"));

    let missing = loader(dir.path(), &[("DATABASE_URL_FILE", "nope")]).load();
    assert!(matches!(missing, Err(ConfigLoadError::SecretFile { .. })));
}

#[test]
fn invalid_values_are_rejected() {
    let dir = tempdir().unwrap();
    let parse = loader(dir.path(), &[("PIXVAULT_CONFIG_JSON", "{not json")]).load();
    assert!(matches!(parse, Err(ConfigLoadError::Parse { .. })));

    let invalid = loader(
        dir.path(),
        &[("PIXVAULT_CONFIG_JSON", r#"{"pipeline": {"scan": {"file_workers": 0}}}"#)],
    )
    .load();
    assert!(matches!(invalid, Err(ConfigLoadError::Invalid(_))));
}
