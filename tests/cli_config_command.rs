//! Integration tests for the `myaei config` template
//!
//! Verifies that the generated template round-trips through the real config
//! loader.

use myaei::analysis::SchemaVersion;
use myaei::cli::generate_config_template;
use myaei::config::{Config, ExhaustionPolicy, StorageBackend};
use std::fs;
use tempfile::TempDir;

/// Helper to create temporary directory for file operations
fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

#[test]
fn test_generated_template_creates_valid_config_file() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, generate_config_template()).expect("Failed to write template");

    let config =
        Config::from_file(&config_path).expect("Generated template should load as valid Config");

    assert_eq!(config.server.port, 8001);
    assert_eq!(config.llm.model(), "llama-3.1-8b-instant");
    assert_eq!(config.analysis.schema, SchemaVersion::Enhanced);
    assert_eq!(config.analysis.on_exhaustion, ExhaustionPolicy::Fallback);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
}

#[test]
fn test_template_file_content_matches_generation() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("config.toml");

    let template = generate_config_template();
    fs::write(&config_path, template).expect("Failed to write template");

    let content = fs::read_to_string(&config_path).expect("Failed to read back");
    assert_eq!(content, template);
}

#[test]
fn test_template_does_not_embed_credentials() {
    let template = generate_config_template();
    assert!(!template.contains("api_key ="));
    assert!(template.contains("GROQ_API_KEY"));
}
