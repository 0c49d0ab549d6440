use thiserror::Error;

/// Failure to turn the source tree into value documents
///
/// Messages name files and template keys only, never values.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path} must contain a YAML map")]
    NotAMap { path: String },
    #[error("{path}: template key \"{key}\" is not defined")]
    MissingKey { path: String, key: String },
    #[error("{path}: cannot render template key \"{key}\": {message}")]
    Template {
        path: String,
        key: String,
        message: String,
    },
    #[error("failed to serialize {output}: {source}")]
    Serialize {
        output: &'static str,
        #[source]
        source: serde_yaml::Error,
    },
}
