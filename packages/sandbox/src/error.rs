// ABOUTME: Error types for sandbox operations
// ABOUTME: Covers Docker transport, image build, container lifecycle, templates, and configuration

use thiserror::Error;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Docker/container-engine transport or API errors
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Image build failed; carries the accumulated build log
    #[error("Image build failed for '{tag}':\n{build_log}")]
    ImageBuild { tag: String, build_log: String },

    /// Container could not be created or started
    #[error("Container failed to start: {0}")]
    ContainerStartFailed(String),

    /// Container does not exist (engine returned 404)
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// Code template could not be resolved
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error (build context, template files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
