//! Error types for the build-and-run pipeline.

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the build-and-run pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Parameter Errors
    // =========================================================================
    /// Malformed parameter spec text or an unparseable parameter value.
    #[error("malformed parameter entry '{entry}': {reason}")]
    Parse { entry: String, reason: String },

    /// A parameter's inferred type has no external-schema mapping.
    ///
    /// Raised when a spec is consumed (wire serialization, workflow
    /// description), never during extraction itself.
    #[error("parameter '{name}' has type '{type_name}' with no schema mapping")]
    TypeConversion { name: String, type_name: String },

    // =========================================================================
    // Stage-In Errors
    // =========================================================================
    /// Missing catalog or missing declared dataset entries.
    ///
    /// The message lists every missing name so the caller can fix the input
    /// in one pass.
    #[error("stage-in failed: {0}")]
    StageIn(String),

    // =========================================================================
    // Build Errors
    // =========================================================================
    /// Image build failed. Carries the engine's build log for line-by-line
    /// reporting before the process exits non-zero.
    #[error("image build failed: {message}")]
    BuildFailed { message: String, log: Vec<String> },

    /// Capturing the current process environment failed.
    #[error("environment capture failed: {0}")]
    EnvironmentCapture(String),

    // =========================================================================
    // Container Errors
    // =========================================================================
    /// An image argument of an unsupported kind.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    /// Container engine API error.
    #[error("container engine error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// Result archive extraction failed.
    #[error("output extraction failed: {0}")]
    Extraction(String),

    /// The in-container computation exited unsuccessfully.
    #[error("computation failed: {0}")]
    Compute(String),

    // =========================================================================
    // I/O and Serialization Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
