//! Error types emitted by the geosync CLI.
//!
//! Keep this error type reasonably small, as every command returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use geosync_core::{CodecError, FilterError, StorageError};
use thiserror::Error;

/// Errors emitted by the geosync CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name.
        field: &'static str,
        /// Environment variable name.
        env: &'static str,
    },
    /// A bounding box was not four comma-separated finite numbers.
    #[error("invalid bbox {value:?}; expected minx,miny,maxx,maxy")]
    InvalidBbox {
        /// Text supplied.
        value: String,
    },
    /// The database path does not exist or is not a file.
    #[error("{field} path {path:?} does not exist or is not a file")]
    MissingSourceFile {
        /// Flag name.
        field: &'static str,
        /// Path supplied.
        path: Utf8PathBuf,
    },
    /// The database path could not be inspected.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        /// Flag name.
        field: &'static str,
        /// Path supplied.
        path: Utf8PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The filter query could not be rendered.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// The store rejected an operation.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A geometry could not be encoded for output.
    #[error("failed to encode {attribute} of feature {feature}: {source}")]
    EncodeGeometry {
        /// Feature identifier.
        feature: u64,
        /// Attribute name.
        attribute: String,
        /// Codec failure.
        #[source]
        source: CodecError,
    },
    /// Serializing a feature failed.
    #[error("failed to serialize feature: {0}")]
    SerializeFeature(#[source] serde_json::Error),
    /// Writing output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
