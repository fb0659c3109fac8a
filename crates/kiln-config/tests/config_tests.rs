//! Configuration loading, saving and validation tests

use kiln_config::{ConfigError, ConfigLoader, KilnConfig, CONFIG_FILE_NAME};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &Path, content: &str) {
    fs::write(dir.join(CONFIG_FILE_NAME), content).unwrap();
}

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::new().with_global_path(dir.path().join("absent-global.toml"))
}

// ============================================================================
// Load / Save
// ============================================================================

#[test]
fn test_save_then_load_preserves_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(CONFIG_FILE_NAME);

    let mut config = KilnConfig::default();
    config.os.name = "Kestrel".to_string();
    config.compile.bootstrap = Some("src/arch/x86_64/boot.S".into());
    config.postprocess.compress = true;
    config.build.history_limit = 10;
    config.save(&path).unwrap();

    let loaded = KilnConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let result = KilnConfig::load_from_file(&temp_dir.path().join(CONFIG_FILE_NAME));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_no_project_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = loader(&temp_dir)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(!config.is_project());
    assert_eq!(config.project.paths.kernel_dir, Path::new("kernel"));
}

#[test]
fn test_embed_entries_parse() {
    let temp_dir = TempDir::new().unwrap();
    write_config(
        temp_dir.path(),
        r#"
[[embed]]
source = "src/font.psf"
args = ["--redefine-sym", "_binary_kernel_src_font_psf_start=_binary_font_psf_start"]
"#,
    );

    let config = loader(&temp_dir)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.project.embeds.len(), 1);
    assert_eq!(config.project.embeds[0].source, Path::new("src/font.psf"));
    assert_eq!(config.project.embeds[0].args.len(), 2);
}

// ============================================================================
// Validation
// ============================================================================

#[rstest]
#[case("schema_version = 99")]
#[case("[os]\nname = \"\"")]
#[case("[toolchain]\ncc = \"\"")]
#[case("[compile]\nextensions = []")]
#[case("[paths]\nsource_roots = []")]
#[case("[postprocess]\ncompression_level = 12")]
#[case("[build]\nhistory_limit = 0")]
fn test_invalid_values_rejected(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), content);

    let result = loader(&temp_dir).load_from_directory(temp_dir.path());
    assert!(result.is_err(), "expected rejection of {:?}", content);
}

#[test]
fn test_syntax_error_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "[os\nname = 1");

    let err = loader(&temp_dir)
        .load_from_directory(temp_dir.path())
        .unwrap_err();
    match err {
        ConfigError::TomlParseError { file, .. } => {
            assert!(file.ends_with(CONFIG_FILE_NAME));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_wrong_type_is_a_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "[build]\njobs = \"four\"");

    let result = loader(&temp_dir).load_from_directory(temp_dir.path());
    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}
