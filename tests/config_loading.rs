use std::io::Write;

use wizrun_core::config::WizrunConfig;
use wizrun_core::types::ExecutionMode;
use wizrun_core::WizardError;
use wizrun_engine::TypeResolver;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
interactive = true
wizard_dir = "/srv/wizards"

[log]
filter = "wizrun=debug"

[[registries]]
name = "material"
root = "Material"

[registries.kinds]
Metal = ["Material"]
Steel = ["Metal"]
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = WizrunConfig::load(tmp.path()).expect("load config");

    assert!(config.engine.interactive);
    assert_eq!(config.engine.default_mode(), ExecutionMode::Interactive);
    assert_eq!(config.wizard_dir(), std::path::PathBuf::from("/srv/wizards"));
    assert_eq!(config.log.filter, "wizrun=debug");
    assert_eq!(config.registries.len(), 1);
    assert_eq!(config.registries[0].kinds["Steel"], vec!["Metal".to_string()]);
}

#[test]
fn test_configured_registry_extends_resolver() {
    let toml_content = r#"
[[registries]]
name = "material"
root = "Material"
[registries.kinds]
Metal = ["Material"]
Steel = ["Metal"]
"#;
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");
    let config = WizrunConfig::load(tmp.path()).expect("load config");

    let resolver = TypeResolver::from_config(&config.registries);
    assert!(resolver.is_compatible("Steel", "Material", None));
    assert!(!resolver.is_compatible("Material", "Steel", None));
    // Built-in hierarchies are still consulted first.
    assert!(resolver.is_compatible("RasterElement", "DataElement", None));
    assert_eq!(resolver.registries().last().map(|r| r.name()), Some("material"));
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"").expect("write toml");

    let config = WizrunConfig::load(tmp.path()).expect("load config");
    assert!(!config.engine.interactive);
    assert_eq!(config.engine.default_mode(), ExecutionMode::Batch);
    assert_eq!(config.log.filter, "info");
    assert!(config.registries.is_empty());
}

#[test]
fn test_env_vars_are_expanded() {
    std::env::set_var("WIZRUN_TEST_WIZARD_DIR", "/opt/wizards");
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\nwizard_dir = \"${WIZRUN_TEST_WIZARD_DIR}\"\n")
        .expect("write toml");

    let config = WizrunConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.wizard_dir(), std::path::PathBuf::from("/opt/wizards"));
}

#[test]
fn test_missing_and_invalid_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = WizrunConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, WizardError::ConfigNotFound(_)));

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\ninteractive = \"sometimes\"\n")
        .expect("write toml");
    let err = WizrunConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, WizardError::Config(_)));
}
