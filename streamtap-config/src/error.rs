//! Errors raised while loading streamtap configuration.

use std::path::PathBuf;

use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    /// `--config` named a file that is not there.
    #[error("streamtap config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// The layers merged but could not be deserialized.
    #[error("cannot read streamtap configuration from {layers}: {source}")]
    Parsing {
        /// Layers that were merged, lowest precedence first.
        layers: String,
        #[source]
        source: Box<figment::Error>,
    },

    /// The merged configuration is out of range.
    #[error("invalid streamtap configuration: {}", .fields.join("; "))]
    Validation {
        /// One `section.field: message` entry per failed check.
        fields: Vec<String>,
        #[source]
        source: ValidationErrors,
    },
}

impl ConfigError {
    pub(crate) fn parsing(layers: &[String], error: figment::Error) -> Self {
        ConfigError::Parsing {
            layers: layers.join(" < "),
            source: Box::new(error),
        }
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        collect_fields("", &errors, &mut fields);
        fields.sort();
        ConfigError::Validation {
            fields,
            source: errors,
        }
    }
}

/// Flattens nested section errors into dotted paths.
fn collect_fields(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(failures) => {
                for failure in failures {
                    let message = match &failure.message {
                        Some(message) => message.to_string(),
                        None => failure.code.to_string(),
                    };
                    out.push(format!("{path}: {message}"));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_fields(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_fields(&format!("{path}[{index}]"), inner, out);
                }
            }
        }
    }
}
