// ABOUTME: Docker-backed integration tests for the container engine
// ABOUTME: Skip cleanly when no Docker daemon is available

use std::collections::HashMap;

use pybox_sandbox::{ContainerEngine, ContainerSpec, DockerEngine, SandboxError, VolumeMount};

/// Connect to Docker, or skip the test when the daemon is unavailable.
async fn connect_or_skip() -> Option<DockerEngine> {
    match DockerEngine::connect().await {
        Ok(engine) => Some(engine),
        Err(_) => {
            println!("Skipping test: Docker not available");
            None
        }
    }
}

#[tokio::test]
async fn test_ping_when_daemon_available() {
    let Some(engine) = connect_or_skip().await else {
        return;
    };
    engine.ping().await.expect("daemon should respond to ping");
}

#[tokio::test]
async fn test_missing_image_reports_absent() {
    let Some(engine) = connect_or_skip().await else {
        return;
    };

    let exists = engine
        .image_exists("pybox-image-that-does-not-exist:latest")
        .await
        .unwrap();
    assert!(!exists);
}

#[tokio::test]
async fn test_stop_missing_container_maps_to_not_found() {
    let Some(engine) = connect_or_skip().await else {
        return;
    };

    let err = engine
        .stop_container("pybox-no-such-container", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::ContainerNotFound(_)));
}

/// Full container round trip against a locally present alpine image:
/// create with a bind mount, verify the bind, exec as nobody, stop twice.
#[tokio::test]
async fn test_container_roundtrip_with_alpine() {
    let Some(engine) = connect_or_skip().await else {
        return;
    };

    if !engine.image_exists("alpine:latest").await.unwrap() {
        println!("Skipping test: alpine:latest not present locally");
        return;
    }

    let workspace = tempfile::tempdir().unwrap();
    let spec = ContainerSpec {
        image: "alpine:latest".to_string(),
        name: None,
        command: vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()],
        env: HashMap::new(),
        volumes: vec![VolumeMount::read_write(
            workspace.path().to_string_lossy().into_owned(),
            "/app/output",
        )],
        memory_limit_mb: 64,
        cpu_quota: 50_000,
        cpu_period: 100_000,
        pids_limit: 32,
        security_opt: vec!["no-new-privileges".to_string()],
        cap_drop: vec!["ALL".to_string()],
        auto_remove: true,
        tty: true,
        labels: HashMap::new(),
    };

    let id = engine.create_container(&spec).await.unwrap();

    let binds = engine.inspect_binds(&id).await.unwrap();
    assert_eq!(binds, vec![spec.volumes[0].to_bind()]);

    let result = engine
        .exec(
            &id,
            vec!["echo".to_string(), "hello".to_string()],
            "nobody",
        )
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.text(), Some("hello\n".to_string()));

    engine.stop_container(&id, 1).await.unwrap();

    // Stopping again must be already-stopped or already-gone, never a hard error
    match engine.stop_container(&id, 1).await {
        Ok(()) | Err(SandboxError::ContainerNotFound(_)) => {}
        Err(e) => panic!("unexpected error stopping twice: {}", e),
    }
}
