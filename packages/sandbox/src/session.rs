// ABOUTME: Sandbox session owning the lifecycle of one execution container
// ABOUTME: Image ensure, container acquire/reuse, templated code execution, idempotent release

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::SandboxConfig;
use crate::engine::{
    archive_build_context, dockerfile_context, ContainerEngine, ContainerSpec, VolumeMount,
};
use crate::error::{Result, SandboxError};
use crate::template::{TemplateStore, DEFAULT_TEMPLATE};

/// Idle command keeping the container alive between executions
const IDLE_COMMAND: &[&str] = &["tail", "-f", "/dev/null"];

/// Label applied to containers managed by pybox
const MANAGED_LABEL: &str = "pybox.managed";

const EMBEDDED_DOCKERFILE: &str = include_str!("../runtime/Dockerfile");

/// One isolated execution environment with an explicit acquire/release
/// lifecycle.
///
/// At most one container is tracked per session. Callers release on every
/// exit path; there is no destructor or exit-hook cleanup.
pub struct SandboxSession {
    engine: Arc<dyn ContainerEngine>,
    config: SandboxConfig,
    templates: TemplateStore,
    container: RwLock<Option<String>>,
}

impl SandboxSession {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: SandboxConfig) -> Self {
        let templates = TemplateStore::new(config.template_dir.clone());
        Self {
            engine,
            config,
            templates,
            container: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// ID of the currently tracked container, if any.
    pub async fn tracked_container(&self) -> Option<String> {
        self.container.read().await.clone()
    }

    /// Build the sandbox image unless the tag already exists.
    ///
    /// Build failures are fatal and carry the engine's build log.
    pub async fn ensure_image(&self) -> Result<()> {
        if self.engine.image_exists(&self.config.image_tag).await? {
            debug!("Image {} already exists", self.config.image_tag);
            return Ok(());
        }

        info!("Image {} not found, building", self.config.image_tag);
        let context = match &self.config.build_context {
            Some(dir) => archive_build_context(dir)?,
            None => dockerfile_context(EMBEDDED_DOCKERFILE)?,
        };

        self.engine
            .build_image(&self.config.image_tag, context)
            .await
    }

    /// Create the sandbox container, or reuse the tracked one.
    ///
    /// With `force` the old container is torn down first, so exactly one
    /// container is tracked afterwards. `volumes` overrides the default
    /// workspace mapping for the new container's lifetime.
    pub async fn acquire_container(
        &self,
        volumes: Option<Vec<VolumeMount>>,
        force: bool,
    ) -> Result<String> {
        let mut tracked = self.container.write().await;

        if let Some(id) = tracked.as_ref() {
            if !force {
                debug!("Reusing sandbox container {}", id);
                return Ok(id.clone());
            }
            info!("Recreating sandbox container");
            self.stop_tracked(&mut tracked).await;
        }

        self.ensure_image().await?;

        let volumes = match volumes {
            Some(volumes) => volumes,
            None => {
                debug!("Using default volume mapping");
                self.config.default_volumes()?
            }
        };

        let spec = self.container_spec(volumes);
        let id = self.engine.create_container(&spec).await?;
        info!("Sandbox container {} ready", id);

        *tracked = Some(id.clone());
        Ok(id)
    }

    /// Render `code` into the named template (default: passthrough) and
    /// execute it inside the container as the configured non-root user.
    ///
    /// Auto-acquires a container when none is tracked. Returns the decoded
    /// combined output, or `None` when the execution produced no output. A
    /// nonzero exit code is part of the output channel, not an error.
    pub async fn run_code(&self, code: &str, template: Option<&str>) -> Result<Option<String>> {
        let container_id = match self.tracked_container().await {
            Some(id) => id,
            None => {
                debug!("No sandbox container tracked, creating one");
                self.acquire_container(None, false).await?
            }
        };

        let rendered = self
            .templates
            .render(template.unwrap_or(DEFAULT_TEMPLATE), code)?;

        let cmd = vec!["python".to_string(), "-c".to_string(), rendered];
        let result = self
            .engine
            .exec(&container_id, cmd, &self.config.exec_user)
            .await?;

        if result.exit_code != 0 {
            warn!("Execution exited with code {}", result.exit_code);
        }

        Ok(result.text())
    }

    /// Stop the tracked container and clear the reference.
    ///
    /// "Already gone" is success; other stop failures are logged and
    /// swallowed. The reference is cleared regardless, so release is
    /// idempotent and safe on every exit path.
    pub async fn release(&self) {
        let mut tracked = self.container.write().await;
        self.stop_tracked(&mut tracked).await;
    }

    async fn stop_tracked(&self, tracked: &mut Option<String>) {
        let Some(id) = tracked.take() else {
            return;
        };

        match self
            .engine
            .stop_container(&id, self.config.stop_timeout_secs)
            .await
        {
            Ok(()) => info!("Sandbox container {} stopped", id),
            Err(SandboxError::ContainerNotFound(_)) => {
                debug!("Sandbox container {} already gone", id);
            }
            Err(e) => {
                warn!("Error stopping sandbox container {}: {}", id, e);
            }
        }
    }

    fn container_spec(&self, volumes: Vec<VolumeMount>) -> ContainerSpec {
        ContainerSpec {
            image: self.config.image_tag.clone(),
            name: self.config.container_name.clone(),
            command: IDLE_COMMAND.iter().map(|s| s.to_string()).collect(),
            env: self.config.container_env(),
            volumes,
            memory_limit_mb: self.config.memory_limit_mb,
            cpu_quota: self.config.cpu_quota,
            cpu_period: self.config.cpu_period,
            pids_limit: self.config.pids_limit,
            security_opt: vec!["no-new-privileges".to_string()],
            cap_drop: vec!["ALL".to_string()],
            auto_remove: true,
            tty: true,
            labels: HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]),
        }
    }
}
