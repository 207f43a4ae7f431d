//! End-to-end store behaviour against a stand-in `keytool` script.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use apk_domain_config::store::load_document;
use apk_domain_config::{ConfigStore, Error, KeystoreProvisioner, KeystoreState, PathStyle, Settings};

const FAKE_KEYTOOL: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/invocations.log"
while [ $# -gt 0 ]; do
  if [ "$1" = "-keystore" ]; then
    shift
    printf 'fake-keystore' > "$1"
  fi
  shift
done
"#;

const FAILING_KEYTOOL: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  if [ "$1" = "-keystore" ]; then
    shift
    printf 'partial' > "$1"
  fi
  shift
done
echo "keytool error: java.lang.Exception: bad dname" >&2
exit 1
"#;

fn install_tool(dir: &Path, script: &str) -> PathBuf {
    let bin = dir.join("bin");
    fs::create_dir_all(&bin).unwrap();
    let path = bin.join("keytool");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn settings_with_tool(dir: &Path, script: &str) -> Settings {
    let tool = install_tool(dir, script);
    let mut settings = Settings::new(dir.join("deploy"));
    settings.keytool = tool.display().to_string();
    settings
}

fn invocations(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("bin/invocations.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn keystore_is_generated_once_per_domain() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ConfigStore::open(settings_with_tool(dir.path(), FAKE_KEYTOOL));

    let first = store.get_or_create("https://www.example.com/page").unwrap();
    let second = store.get_or_create("http://example.com").unwrap();

    assert_eq!(first.package_name, second.package_name);
    assert_eq!(first.key_alias, second.key_alias);
    assert_eq!(first.keystore_password, second.keystore_password);
    assert_eq!(fs::read_to_string(&first.keystore_path).unwrap(), "fake-keystore");

    let calls = invocations(dir.path());
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!(call.starts_with("-genkeypair"));
    assert!(call.contains("-alias examplecom"));
    assert!(call.contains("-keyalg RSA -keysize 2048 -validity 10000"));
    assert!(call.contains(&format!("-storepass {}", first.keystore_password)));
    assert!(call.contains("CN=example.com, OU=WebApp, O=AutoBuild"));
}

#[test]
fn reopened_store_does_not_regenerate() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_with_tool(dir.path(), FAKE_KEYTOOL);

    let created = ConfigStore::open(settings.clone())
        .get_or_create("123.test.io")
        .unwrap();
    assert_eq!(created.package_name, "com.io.test.domain123");

    let again = ConfigStore::open(settings).get_or_create("123.test.io").unwrap();
    assert_eq!(created, again);
    assert_eq!(invocations(dir.path()).len(), 1);
}

#[test]
fn remove_keeps_keystore_and_recreate_reuses_it() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_with_tool(dir.path(), FAKE_KEYTOOL);
    let mut store = ConfigStore::open(settings.clone());

    let config = store.get_or_create("example.com").unwrap();
    assert!(store.remove("example.com").unwrap());
    assert!(config.keystore_path.exists());
    assert!(!load_document(&settings.config_file).contains_key("example.com"));

    let recreated = store.get_or_create("example.com").unwrap();
    assert_eq!(recreated.keystore_path, config.keystore_path);
    assert_eq!(invocations(dir.path()).len(), 1);
}

#[test]
fn keytool_failure_is_reported_and_nothing_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_with_tool(dir.path(), FAILING_KEYTOOL);
    let mut store = ConfigStore::open(settings.clone());

    let err = store.get_or_create("example.com").unwrap_err();
    match err {
        Error::KeytoolFailed { status, stderr } => {
            assert_eq!(status.code(), Some(1));
            assert!(stderr.contains("bad dname"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.list().is_empty());
    assert!(load_document(&settings.config_file).is_empty());
    assert!(!settings.keystores_dir.join("example_com.jks").exists());
}

#[test]
fn relative_path_style_records_relative_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings_with_tool(dir.path(), FAKE_KEYTOOL);
    settings.path_style = PathStyle::Relative;
    let mut store = ConfigStore::open(settings.clone());

    let config = store.get_or_create("example.com").unwrap();
    assert_eq!(config.keystore_path, PathBuf::from("keystores/example_com.jks"));
    assert!(settings.base_dir.join(&config.keystore_path).exists());
}

#[test]
fn provisioner_rebases_parent_paths() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_with_tool(dir.path(), FAKE_KEYTOOL);
    let provisioner = KeystoreProvisioner::new(settings);

    let out = provisioner
        .ensure_keystore("example.com", Path::new("../signing/example_com.jks"), "pw123456", "examplecom")
        .unwrap();
    assert_eq!(out.state, KeystoreState::Generated);
    assert_eq!(out.path, dir.path().join("signing/example_com.jks"));

    let again = provisioner
        .ensure_keystore("example.com", &out.path, "pw123456", "examplecom")
        .unwrap();
    assert_eq!(again.state, KeystoreState::Existing);
    assert_eq!(invocations(dir.path()).len(), 1);
}

fn relative_to_cwd(path: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap();
    let mut rel = PathBuf::new();
    for _ in 1..cwd.components().count() {
        rel.push("..");
    }
    rel.join(path.strip_prefix("/").unwrap())
}

#[test]
fn relative_base_dir_records_the_generated_keystore() {
    let dir = tempfile::tempdir().unwrap();
    let tool = install_tool(dir.path(), FAKE_KEYTOOL);
    let mut settings = Settings::new(relative_to_cwd(&dir.path().join("deploy")));
    settings.keytool = tool.display().to_string();
    let mut store = ConfigStore::open(settings);

    let config = store.get_or_create("example.com").unwrap();
    let expected = dir.path().join("deploy/keystores/example_com.jks");
    assert_eq!(config.keystore_path, expected);
    assert_eq!(fs::read_to_string(&expected).unwrap(), "fake-keystore");
}

#[test]
fn relative_style_with_sibling_keystores_dir_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings_with_tool(dir.path(), FAKE_KEYTOOL);
    settings.keystores_dir = dir.path().join("signing");
    settings.path_style = PathStyle::Relative;
    let provisioner = KeystoreProvisioner::new(settings.clone());
    let mut store = ConfigStore::open(settings);

    let config = store.get_or_create("example.com").unwrap();
    assert_eq!(config.keystore_path, PathBuf::from("../signing/example_com.jks"));
    let written = dir.path().join("signing/example_com.jks");
    assert_eq!(provisioner.resolve_path(&config.keystore_path), written);
    assert_eq!(fs::read_to_string(&written).unwrap(), "fake-keystore");
}

#[test]
fn relative_style_refuses_keystores_outside_project() {
    let dir = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let mut settings = settings_with_tool(dir.path(), FAKE_KEYTOOL);
    settings.keystores_dir = elsewhere.path().join("keys");
    settings.path_style = PathStyle::Relative;
    let mut store = ConfigStore::open(settings);

    let err = store.get_or_create("example.com").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(invocations(dir.path()).is_empty());
    assert!(store.list().is_empty());
}
