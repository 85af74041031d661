// ABOUTME: ContainerEngine trait and shared types for sandbox execution backends
// ABOUTME: Defines the abstract seam between session lifecycle and the container engine API

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod docker;

pub use docker::DockerEngine;

/// Host-path-to-container-path bind mount with an access mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub readonly: bool,
}

impl VolumeMount {
    pub fn read_write(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            readonly: false,
        }
    }

    pub fn read_only(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            readonly: true,
        }
    }

    /// Bind specification in the engine's `host:container:mode` form.
    pub fn to_bind(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path,
            self.container_path,
            if self.readonly { "ro" } else { "rw" }
        )
    }
}

/// Engine-agnostic description of the container to launch.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    /// Engine assigns a name when absent.
    pub name: Option<String>,
    /// Idle command keeping the container alive between executions.
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub memory_limit_mb: u64,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    pub pids_limit: i64,
    pub security_opt: Vec<String>,
    pub cap_drop: Vec<String>,
    pub auto_remove: bool,
    pub tty: bool,
    pub labels: HashMap<String, String>,
}

/// Result of one exec inside a container.
#[derive(Debug)]
pub struct ExecOutput {
    pub exit_code: i64,
    /// Combined stdout/stderr bytes in arrival order.
    pub output: Vec<u8>,
}

impl ExecOutput {
    /// Decoded combined output, or `None` when the execution produced nothing.
    pub fn text(&self) -> Option<String> {
        if self.output.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.output).into_owned())
        }
    }
}

/// Abstract container engine backend.
///
/// `DockerEngine` is the production implementation; tests substitute a mock
/// to exercise session lifecycle without a daemon.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check that the engine daemon is reachable.
    async fn ping(&self) -> Result<()>;

    /// Check whether an image tag exists locally.
    async fn image_exists(&self, tag: &str) -> Result<bool>;

    /// Build an image from a tar'd build context.
    ///
    /// Build progress is streamed into the log; on failure the accumulated
    /// build log is surfaced in the error.
    async fn build_image(&self, tag: &str, context_tar: Vec<u8>) -> Result<()>;

    /// Create and start a container; returns the container ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Gracefully stop a container. "Already stopped" is success; a missing
    /// container maps to `SandboxError::ContainerNotFound`.
    async fn stop_container(&self, container_id: &str, timeout_secs: i64) -> Result<()>;

    /// Execute a command inside a running container as the named user,
    /// capturing combined stdout/stderr.
    async fn exec(&self, container_id: &str, cmd: Vec<String>, user: &str) -> Result<ExecOutput>;

    /// Host bind specifications of a container, as `host:container:mode`.
    async fn inspect_binds(&self, container_id: &str) -> Result<Vec<String>>;
}

/// Tar up a build-context directory for the engine's image build.
pub fn archive_build_context(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", dir)?;
    archive.into_inner()
}

/// Single-file build context holding just a Dockerfile.
pub fn dockerfile_context(dockerfile: &str) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut archive = tar::Builder::new(Vec::new());
    archive.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;
    archive.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_formatting() {
        let rw = VolumeMount::read_write("/tmp/host", "/app/output");
        assert_eq!(rw.to_bind(), "/tmp/host:/app/output:rw");

        let ro = VolumeMount::read_only("/tmp/data", "/app/input");
        assert_eq!(ro.to_bind(), "/tmp/data:/app/input:ro");
    }

    #[test]
    fn test_volume_mount_serde_roundtrip() {
        let mount = VolumeMount::read_only("/srv/in", "/app/input");
        let json = serde_json::to_string(&mount).unwrap();
        let back: VolumeMount = serde_json::from_str(&json).unwrap();
        assert_eq!(mount, back);
    }

    #[test]
    fn test_exec_output_text() {
        let empty = ExecOutput {
            exit_code: 0,
            output: vec![],
        };
        assert_eq!(empty.text(), None);

        let hello = ExecOutput {
            exit_code: 0,
            output: b"hello\n".to_vec(),
        };
        assert_eq!(hello.text(), Some("hello\n".to_string()));
    }

    #[test]
    fn test_dockerfile_context_is_valid_tar() {
        let tar_bytes = dockerfile_context("FROM python:3.11-slim\n").unwrap();

        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        let entries: Vec<_> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().into_owned())
            .collect();
        assert_eq!(entries, vec![std::path::PathBuf::from("Dockerfile")]);
    }
}
