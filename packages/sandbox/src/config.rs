// ABOUTME: Sandbox configuration with enumerated recognized options
// ABOUTME: Fixed resource ceilings, image/build settings, and container environment injection

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::VolumeMount;
use crate::error::{Result, SandboxError};

/// Image tag built and reused for sandbox containers
pub const DEFAULT_IMAGE_TAG: &str = "py-sandbox";

/// Container path the default workspace mapping binds to
pub const WORKSPACE_CONTAINER_PATH: &str = "/app/output";

/// Sandbox configuration.
///
/// All credential and proxy values are injected here rather than read from
/// the process environment at call time; `from_env` is the one place that
/// touches environment variables, and only the recognized ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Image tag to build or reuse
    pub image_tag: String,
    /// Build-context directory; when absent the embedded Dockerfile is used
    pub build_context: Option<PathBuf>,
    /// Memory ceiling for the container, in megabytes
    pub memory_limit_mb: u64,
    /// CPU quota per scheduling period (50_000 of 100_000 = half a core)
    pub cpu_quota: i64,
    pub cpu_period: i64,
    /// Process-count ceiling inside the container
    pub pids_limit: i64,
    /// Non-root user executions run as
    pub exec_user: String,
    /// Optional fixed container name; engine assigns one when absent
    pub container_name: Option<String>,
    /// Grace period for container stop
    pub stop_timeout_secs: i64,
    /// Host directory bound read-write to `/app/output` by default
    pub workspace_dir: PathBuf,
    /// Directory holding `<name>.tmpl` code templates
    pub template_dir: Option<PathBuf>,
    /// Model identifier forwarded into the container as MODEL_NAME
    pub model_name: Option<String>,
    /// API token forwarded into the container as OPENAI_TOKEN
    pub api_token: Option<String>,
    /// Outbound proxy address forwarded into the container as PROXY
    pub proxy: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image_tag: DEFAULT_IMAGE_TAG.to_string(),
            build_context: None,
            memory_limit_mb: 512,
            cpu_quota: 50_000,
            cpu_period: 100_000,
            pids_limit: 100,
            exec_user: "nobody".to_string(),
            container_name: None,
            stop_timeout_secs: 10,
            workspace_dir: PathBuf::from("./workspace"),
            template_dir: None,
            model_name: None,
            api_token: None,
            proxy: None,
        }
    }
}

impl SandboxConfig {
    /// Build a configuration from the recognized environment variables.
    ///
    /// Recognized: MODEL_NAME, OPENAI_TOKEN, PROXY_IN_DOCKER, SANDBOX_IMAGE,
    /// SANDBOX_BUILD_CONTEXT, SANDBOX_WORKSPACE, SANDBOX_MEMORY_MB,
    /// SANDBOX_CPU_QUOTA, SANDBOX_PIDS_LIMIT, SANDBOX_EXEC_USER,
    /// SANDBOX_TEMPLATE_DIR, SANDBOX_STOP_TIMEOUT_SECS. Anything else is
    /// ignored. Unparseable numeric values are configuration errors, not
    /// silent fallbacks.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let image_tag = env::var("SANDBOX_IMAGE").unwrap_or(defaults.image_tag);
        let build_context = env::var("SANDBOX_BUILD_CONTEXT").ok().map(PathBuf::from);
        let workspace_dir = env::var("SANDBOX_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace_dir);
        let template_dir = env::var("SANDBOX_TEMPLATE_DIR").ok().map(PathBuf::from);
        let exec_user = env::var("SANDBOX_EXEC_USER").unwrap_or(defaults.exec_user);

        let memory_limit_mb = parse_env_var("SANDBOX_MEMORY_MB")?
            .unwrap_or(defaults.memory_limit_mb);
        let cpu_quota = parse_env_var("SANDBOX_CPU_QUOTA")?.unwrap_or(defaults.cpu_quota);
        let pids_limit = parse_env_var("SANDBOX_PIDS_LIMIT")?.unwrap_or(defaults.pids_limit);
        let stop_timeout_secs =
            parse_env_var("SANDBOX_STOP_TIMEOUT_SECS")?.unwrap_or(defaults.stop_timeout_secs);

        if memory_limit_mb == 0 {
            return Err(SandboxError::InvalidConfiguration(
                "SANDBOX_MEMORY_MB must be greater than 0".to_string(),
            ));
        }
        if pids_limit <= 0 {
            return Err(SandboxError::InvalidConfiguration(
                "SANDBOX_PIDS_LIMIT must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            image_tag,
            build_context,
            memory_limit_mb,
            cpu_quota,
            cpu_period: defaults.cpu_period,
            pids_limit,
            exec_user,
            container_name: None,
            stop_timeout_secs,
            workspace_dir,
            template_dir,
            model_name: env::var("MODEL_NAME").ok(),
            api_token: env::var("OPENAI_TOKEN").ok(),
            proxy: env::var("PROXY_IN_DOCKER").ok(),
        })
    }

    /// Default volume mapping: workspace directory → /app/output, read-write.
    ///
    /// The host side is made absolute here since the engine rejects relative
    /// bind paths.
    pub fn default_volumes(&self) -> Result<Vec<VolumeMount>> {
        let host = if self.workspace_dir.is_absolute() {
            self.workspace_dir.clone()
        } else {
            env::current_dir()?.join(&self.workspace_dir)
        };

        Ok(vec![VolumeMount::read_write(
            host.to_string_lossy().into_owned(),
            WORKSPACE_CONTAINER_PATH,
        )])
    }

    /// Minimal environment injected into the container.
    pub fn container_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(model) = &self.model_name {
            env.insert("MODEL_NAME".to_string(), model.clone());
        }
        if let Some(token) = &self.api_token {
            env.insert("OPENAI_TOKEN".to_string(), token.clone());
        }
        if let Some(proxy) = &self.proxy {
            env.insert("PROXY".to_string(), proxy.clone());
        }
        env
    }
}

/// Parse an optional numeric environment variable, surfacing parse failures.
fn parse_env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            SandboxError::InvalidConfiguration(format!("Invalid value for {}: {}", name, raw))
        }),
        Err(_) => Ok(None),
    }
}
