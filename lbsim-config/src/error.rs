//! Error types for configuration loading and validation

use std::path::PathBuf;
use thiserror::Error;
use validator::ValidationErrors;

/// Unified configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found error.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Configuration validation error.
    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Validation(#[source] ValidationErrors),

    /// Figment parsing error.
    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] Box<figment::Error>),

    /// Rendering the effective configuration failed.
    #[error("Configuration serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

fn format_validation_errors(errors: &ValidationErrors) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    for (section, kind) in errors.errors() {
        match kind {
            validator::ValidationErrorsKind::Struct(nested) => {
                let _ = write!(output, "{}", prefixed(section, &format_validation_errors(nested)));
            }
            validator::ValidationErrorsKind::Field(field_errors) => {
                let _ = writeln!(output, "Field '{}':", section);
                for error in field_errors {
                    let message = match &error.message {
                        Some(msg) => msg.to_string(),
                        None => error.code.to_string(),
                    };
                    let _ = writeln!(output, "  - {}", message);
                }
            }
            validator::ValidationErrorsKind::List(_) => {
                let _ = writeln!(output, "Field '{}': invalid list entry", section);
            }
        }
    }
    output
}

fn prefixed(section: &str, nested: &str) -> String {
    nested.replace("Field '", &format!("Field '{}.", section))
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Parsing(Box::new(error))
    }
}
