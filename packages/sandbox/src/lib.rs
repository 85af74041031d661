// ABOUTME: Sandbox library for resource-capped execution of untrusted Python code
// ABOUTME: Docker-backed container lifecycle, templated execution, and injected configuration

pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod template;

pub use config::{SandboxConfig, DEFAULT_IMAGE_TAG, WORKSPACE_CONTAINER_PATH};
pub use engine::{ContainerEngine, ContainerSpec, DockerEngine, ExecOutput, VolumeMount};
pub use error::{Result, SandboxError};
pub use session::SandboxSession;
pub use template::{TemplateStore, DEFAULT_TEMPLATE};
