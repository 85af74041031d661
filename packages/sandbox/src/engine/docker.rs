// ABOUTME: Docker implementation of ContainerEngine using bollard
// ABOUTME: Handles image inspect/build, container create/start/stop, and user-scoped exec

use super::{ContainerEngine, ContainerSpec, ExecOutput};
use crate::error::{Result, SandboxError};
use async_trait::async_trait;
use bollard::{
    container::{Config, CreateContainerOptions, LogOutput, StartContainerOptions, StopContainerOptions},
    errors::Error as BollardError,
    exec::{CreateExecOptions, StartExecResults},
    image::BuildImageOptions,
    models::HostConfig,
    Docker,
};
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

/// Docker-backed container engine
pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connect to the Docker daemon with platform socket defaults and verify
    /// it responds.
    ///
    /// On Unix: /var/run/docker.sock
    /// On Windows: npipe:////./pipe/docker_engine
    pub async fn connect() -> Result<Self> {
        #[cfg(unix)]
        let client = Docker::connect_with_socket_defaults().map_err(SandboxError::Docker)?;

        #[cfg(windows)]
        let client = Docker::connect_with_named_pipe_defaults().map_err(SandboxError::Docker)?;

        client.ping().await.map_err(|e| {
            error!("Failed to connect to Docker daemon: {}", e);
            SandboxError::Docker(e)
        })?;

        info!("Connected to Docker daemon");
        Ok(Self { client })
    }

    /// Create with a specific Docker connection.
    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }

    /// Convert the engine-agnostic spec to a bollard container config.
    fn to_bollard_config(spec: &ContainerSpec) -> Config<String> {
        let binds: Vec<String> = spec.volumes.iter().map(|v| v.to_bind()).collect();

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            memory: Some((spec.memory_limit_mb * 1024 * 1024) as i64),
            cpu_quota: Some(spec.cpu_quota),
            cpu_period: Some(spec.cpu_period),
            pids_limit: Some(spec.pids_limit),
            security_opt: Some(spec.security_opt.clone()),
            cap_drop: Some(spec.cap_drop.clone()),
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(env),
            tty: Some(spec.tty),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.client.ping().await.map_err(SandboxError::Docker)?;
        Ok(())
    }

    async fn image_exists(&self, tag: &str) -> Result<bool> {
        match self.client.inspect_image(tag).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(SandboxError::Docker(e)),
        }
    }

    async fn build_image(&self, tag: &str, context_tar: Vec<u8>) -> Result<()> {
        info!("Building image: {}", tag);

        let options = BuildImageOptions::<String> {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .client
            .build_image(options, None, Some(context_tar.into()));

        let mut build_log = String::new();
        let mut build_error: Option<String> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(line) = &progress.stream {
                        let line = line.trim_end();
                        if !line.is_empty() {
                            debug!("build: {}", line);
                            build_log.push_str(line);
                            build_log.push('\n');
                        }
                    }
                    if let Some(err) = progress.error {
                        build_error = Some(err);
                    }
                }
                Err(e) => {
                    build_error = Some(e.to_string());
                }
            }
        }

        if let Some(err) = build_error {
            error!("Image build failed for {}: {}", tag, err);
            build_log.push_str(&err);
            build_log.push('\n');
            return Err(SandboxError::ImageBuild {
                tag: tag.to_string(),
                build_log,
            });
        }

        info!("Successfully built image: {}", tag);
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        debug!("Creating container from image {}", spec.image);

        let config = Self::to_bollard_config(spec);
        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let container = self
            .client
            .create_container(options, config)
            .await
            .map_err(|e| {
                error!("Failed to create container: {}", e);
                SandboxError::ContainerStartFailed(e.to_string())
            })?;

        self.client
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                error!("Failed to start container {}: {}", container.id, e);
                SandboxError::ContainerStartFailed(e.to_string())
            })?;

        info!("Started container {}", container.id);
        Ok(container.id)
    }

    async fn stop_container(&self, container_id: &str, timeout_secs: i64) -> Result<()> {
        debug!("Stopping container {}", container_id);

        let options = StopContainerOptions { t: timeout_secs };

        match self.client.stop_container(container_id, Some(options)).await {
            Ok(_) => {
                info!("Stopped container {}", container_id);
                Ok(())
            }
            // Container already stopped is not an error
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!("Container {} already stopped", container_id);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(SandboxError::ContainerNotFound(container_id.to_string())),
            Err(e) => {
                warn!("Failed to stop container {}: {}", container_id, e);
                Err(SandboxError::Docker(e))
            }
        }
    }

    async fn exec(&self, container_id: &str, cmd: Vec<String>, user: &str) -> Result<ExecOutput> {
        debug!("Executing command in container {} as {}", container_id, user);

        let exec_config = CreateExecOptions {
            cmd: Some(cmd),
            user: Some(user.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .client
            .create_exec(container_id, exec_config)
            .await
            .map_err(SandboxError::Docker)?;

        let start_result = self
            .client
            .start_exec(&exec.id, None)
            .await
            .map_err(SandboxError::Docker)?;

        // Combined stdout/stderr in arrival order
        let mut combined = Vec::new();

        match start_result {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message })
                        | Ok(LogOutput::StdErr { message })
                        | Ok(LogOutput::Console { message }) => {
                            combined.extend_from_slice(&message)
                        }
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(SandboxError::ContainerStartFailed(
                    "Exec was detached unexpectedly".to_string(),
                ))
            }
        }

        let exec_inspect = self
            .client
            .inspect_exec(&exec.id)
            .await
            .map_err(SandboxError::Docker)?;

        let exit_code = exec_inspect.exit_code.unwrap_or(0);

        Ok(ExecOutput {
            exit_code,
            output: combined,
        })
    }

    async fn inspect_binds(&self, container_id: &str) -> Result<Vec<String>> {
        let inspect = self
            .client
            .inspect_container(container_id, None)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => SandboxError::ContainerNotFound(container_id.to_string()),
                _ => SandboxError::Docker(e),
            })?;

        Ok(inspect
            .host_config
            .and_then(|hc| hc.binds)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VolumeMount;
    use std::collections::HashMap;

    #[test]
    fn test_container_spec_conversion() {
        let spec = ContainerSpec {
            image: "py-sandbox".to_string(),
            name: None,
            command: vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()],
            env: HashMap::from([("MODEL_NAME".to_string(), "gpt-4o".to_string())]),
            volumes: vec![VolumeMount::read_write("/tmp/workspace", "/app/output")],
            memory_limit_mb: 512,
            cpu_quota: 50_000,
            cpu_period: 100_000,
            pids_limit: 100,
            security_opt: vec!["no-new-privileges".to_string()],
            cap_drop: vec!["ALL".to_string()],
            auto_remove: true,
            tty: true,
            labels: HashMap::new(),
        };

        let config = DockerEngine::to_bollard_config(&spec);

        assert_eq!(config.image, Some("py-sandbox".to_string()));
        assert_eq!(
            config.env,
            Some(vec!["MODEL_NAME=gpt-4o".to_string()])
        );
        assert_eq!(config.tty, Some(true));

        let host_config = config.host_config.unwrap();
        assert_eq!(
            host_config.binds,
            Some(vec!["/tmp/workspace:/app/output:rw".to_string()])
        );
        assert_eq!(host_config.memory, Some(512 * 1024 * 1024));
        assert_eq!(host_config.cpu_quota, Some(50_000));
        assert_eq!(host_config.pids_limit, Some(100));
        assert_eq!(
            host_config.security_opt,
            Some(vec!["no-new-privileges".to_string()])
        );
        assert_eq!(host_config.cap_drop, Some(vec!["ALL".to_string()]));
        assert_eq!(host_config.auto_remove, Some(true));
    }

    #[test]
    fn test_empty_volumes_produce_no_binds() {
        let spec = ContainerSpec {
            image: "py-sandbox".to_string(),
            name: None,
            command: vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()],
            env: HashMap::new(),
            volumes: vec![],
            memory_limit_mb: 512,
            cpu_quota: 50_000,
            cpu_period: 100_000,
            pids_limit: 100,
            security_opt: vec![],
            cap_drop: vec![],
            auto_remove: true,
            tty: true,
            labels: HashMap::new(),
        };

        let config = DockerEngine::to_bollard_config(&spec);
        assert_eq!(config.host_config.unwrap().binds, None);
    }
}
