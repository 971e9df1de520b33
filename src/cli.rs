//! Command-line interface.
//!
//! `serve` (the default) runs the MCP server; the `validate-*` commands run
//! the protocol validator offline and report findings with their JSON paths.

use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::core::config::ProtocolsConfig;
use crate::core::{Error, Result};
use crate::domains::protocols::{ProtocolValidator, ValidationReport, ValidatorConfig};

#[derive(Parser, Debug)]
#[command(name = "protocol-mcp-server")]
#[command(about = "MCP server that turns declarative API protocols into tools")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the MCP server (default if no subcommand given)
    Serve,

    /// Validate one protocol file; exits non-zero when it is invalid
    ValidateProtocol {
        /// Path to the protocol JSON file
        path: PathBuf,
    },

    /// Validate every protocol file in a directory
    ValidateAllProtocols {
        /// Directory to scan (defaults to the configured protocols directory)
        dir: Option<PathBuf>,
    },
}

/// Validation result for one file.
#[derive(Debug)]
pub struct FileValidation {
    pub path: PathBuf,
    /// The report, or why the file could not be validated at all.
    pub outcome: std::result::Result<ValidationReport, String>,
}

impl FileValidation {
    pub fn is_valid(&self) -> bool {
        matches!(&self.outcome, Ok(report) if report.valid)
    }

    /// Human-readable summary, one finding per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let path = self.path.display();
        match &self.outcome {
            Err(reason) => {
                let _ = writeln!(out, "✗ {path}: {reason}");
            }
            Ok(report) => {
                let mark = if report.valid { "✓" } else { "✗" };
                let _ = writeln!(
                    out,
                    "{mark} {path}: {} error(s), {} warning(s)",
                    report.errors.len(),
                    report.warnings.len()
                );
                for line in report.error_messages().iter().chain(&report.warning_messages()) {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }
        out
    }
}

/// Validator built from the protocol settings.
pub fn validator(config: &ProtocolsConfig) -> ProtocolValidator {
    ProtocolValidator::new(ValidatorConfig::from(config))
}

/// Read and validate one protocol file.
pub fn validate_file(validator: &ProtocolValidator, path: &Path, max_bytes: usize) -> FileValidation {
    let outcome = read_json(path, max_bytes).map(|raw| validator.validate(&raw));
    FileValidation {
        path: path.to_path_buf(),
        outcome,
    }
}

/// Validate every `*.json` file directly inside `dir`, sorted by path.
pub fn validate_directory(
    validator: &ProtocolValidator,
    dir: &Path,
    max_bytes: usize,
) -> Result<Vec<FileValidation>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(Error::config(format!(
            "no protocol files found in {}",
            dir.display()
        )));
    }
    paths.sort();
    Ok(paths
        .iter()
        .map(|path| validate_file(validator, path, max_bytes))
        .collect())
}

fn read_json(path: &Path, max_bytes: usize) -> std::result::Result<serde_json::Value, String> {
    let size = std::fs::metadata(path).map_err(|e| e.to_string())?.len();
    if size > max_bytes as u64 {
        return Err(format!("file exceeds the {max_bytes} byte limit"));
    }
    let content = std::fs::read(path).map_err(|e| e.to_string())?;
    serde_json::from_slice(&content).map_err(|e| format!("invalid JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::protocols::validator::fixtures::weather;
    use serde_json::json;
    use tempfile::TempDir;

    const LIMIT: usize = 1024 * 1024;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::parse_from(["protocol-mcp-server", "validate-protocol", "p.json"]);
        assert_eq!(
            cli.command,
            Some(Command::ValidateProtocol {
                path: PathBuf::from("p.json")
            })
        );
        assert_eq!(Cli::parse_from(["protocol-mcp-server"]).command, None);
        assert_eq!(
            Cli::parse_from(["protocol-mcp-server", "validate-all-protocols"]).command,
            Some(Command::ValidateAllProtocols { dir: None })
        );
    }

    #[test]
    fn test_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "weather.json", &weather().to_string());
        let result = validate_file(&ProtocolValidator::default(), &path, LIMIT);
        assert!(result.is_valid());
        assert!(result.render().starts_with("✓"));
    }

    #[test]
    fn test_invalid_file_lists_paths() {
        let dir = TempDir::new().unwrap();
        let mut raw = weather();
        raw["endpoints"][0]["path"] = json!("http://api.weather.example/current");
        let path = write(&dir, "weather.json", &raw.to_string());

        let result = validate_file(&ProtocolValidator::default(), &path, LIMIT);
        assert!(!result.is_valid());
        assert!(result.render().contains("[SecurityError] endpoints[0].path"));
    }

    #[test]
    fn test_unreadable_and_malformed_files() {
        let dir = TempDir::new().unwrap();
        let broken = write(&dir, "broken.json", "{");
        let validator = ProtocolValidator::default();

        assert!(!validate_file(&validator, &broken, LIMIT).is_valid());
        assert!(!validate_file(&validator, &dir.path().join("missing.json"), LIMIT).is_valid());
        let tiny = validate_file(&validator, &broken, 0);
        assert!(tiny.render().contains("byte limit"));
    }

    #[test]
    fn test_directory_validation() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.json", &weather().to_string());
        write(&dir, "a.json", "{");
        write(&dir, "readme.md", "skip");

        let results = validate_directory(&ProtocolValidator::default(), dir.path(), LIMIT).unwrap();
        let valid: Vec<bool> = results.iter().map(FileValidation::is_valid).collect();
        assert_eq!(valid, vec![false, true]);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(validate_directory(&ProtocolValidator::default(), dir.path(), LIMIT).is_err());
    }
}
