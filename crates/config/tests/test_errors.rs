//! Tests for error handling

use aura_config::ConfigError;
use std::io;
use std::path::PathBuf;

#[test]
fn test_io_error_display() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err = ConfigError::Io(io_err);

    let display = format!("{}", err);
    assert!(display.contains("LEDGER IO ERROR"));
    assert!(display.contains("file not found"));
}

#[test]
fn test_json_error_display() {
    let json_err: serde_json::Error =
        serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
    let err = ConfigError::Json(json_err);

    assert!(err.to_string().contains("LEDGER UNREADABLE"));
}

#[test]
fn test_not_found_error_display() {
    let err = ConfigError::NotFound(PathBuf::from("/some/path"));

    let display = err.to_string();
    assert!(display.contains("LEDGER NOT FOUND"));
    assert!(display.contains("/some/path"));
}

#[test]
fn test_invalid_error_display() {
    let err = ConfigError::Invalid("max_steps must be at least 1".to_string());
    assert_eq!(
        err.to_string(),
        "INVALID LEDGER ENTRY: max_steps must be at least 1"
    );
}

#[test]
fn test_io_error_from() {
    fn produce() -> aura_config::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))?;
        Ok(())
    }
    assert!(matches!(produce(), Err(ConfigError::Io(_))));
}
