use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use pybox_sandbox::{
    ContainerEngine, DockerEngine, SandboxConfig, SandboxSession, VolumeMount,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pybox")]
#[command(about = "Run untrusted Python code in a resource-capped Docker sandbox")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute code inside the sandbox
    Run {
        /// Python file to execute
        #[arg(long, conflicts_with = "code")]
        input_file: Option<PathBuf>,

        /// Inline code to execute
        #[arg(long)]
        code: Option<String>,

        /// Template to render the code into
        #[arg(long)]
        template: Option<String>,

        /// Recreate the container even if one is already running
        #[arg(long)]
        force: bool,

        /// Volume mapping HOST:CONTAINER[:ro|rw]; repeatable, overrides the default
        #[arg(long = "volume", value_parser = parse_volume)]
        volumes: Vec<VolumeMount>,
    },
    /// Build the sandbox image if it does not exist
    Build,
    /// Report engine and image availability
    Status,
}

fn parse_volume(raw: &str) -> Result<VolumeMount, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    match parts.as_slice() {
        [host, container] if !host.is_empty() && !container.is_empty() => {
            Ok(VolumeMount::read_write(*host, *container))
        }
        [host, container, "ro"] if !host.is_empty() && !container.is_empty() => {
            Ok(VolumeMount::read_only(*host, *container))
        }
        [host, container, "rw"] if !host.is_empty() && !container.is_empty() => {
            Ok(VolumeMount::read_write(*host, *container))
        }
        _ => Err(format!("expected HOST:CONTAINER[:ro|rw], got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match handle_command(cli.command).await {
        Ok(_) => {}
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            input_file,
            code,
            template,
            force,
            volumes,
        } => run(input_file, code, template, force, volumes).await,
        Commands::Build => build().await,
        Commands::Status => status().await,
    }
}

async fn run(
    input_file: Option<PathBuf>,
    code: Option<String>,
    template: Option<String>,
    force: bool,
    volumes: Vec<VolumeMount>,
) -> anyhow::Result<()> {
    let source = match (input_file, code) {
        (Some(path), None) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, Some(code)) => code,
        _ => anyhow::bail!("provide exactly one of --input-file or --code"),
    };

    let config = SandboxConfig::from_env()?;
    let engine = Arc::new(DockerEngine::connect().await?);
    let session = SandboxSession::new(engine, config);

    let volumes = if volumes.is_empty() {
        None
    } else {
        Some(volumes)
    };

    // Release the container on every exit path
    let result = async {
        session.acquire_container(volumes, force).await?;
        session.run_code(&source, template.as_deref()).await
    }
    .await;
    session.release().await;

    match result? {
        Some(output) => print!("{}", output),
        None => println!("{}", "(no output)".dimmed()),
    }

    Ok(())
}

async fn build() -> anyhow::Result<()> {
    let config = SandboxConfig::from_env()?;
    let engine = Arc::new(DockerEngine::connect().await?);
    let session = SandboxSession::new(engine, config);

    session.ensure_image().await?;
    println!(
        "Image {} is ready",
        session.config().image_tag.as_str().green()
    );
    Ok(())
}

async fn status() -> anyhow::Result<()> {
    let config = SandboxConfig::from_env()?;

    match DockerEngine::connect().await {
        Ok(engine) => {
            println!("Container engine: {}", "reachable".green());

            let exists = engine.image_exists(&config.image_tag).await?;
            let state = if exists {
                "present".green()
            } else {
                "absent".yellow()
            };
            println!("Image {}: {}", config.image_tag, state);
        }
        Err(e) => {
            println!("Container engine: {} ({})", "unreachable".red(), e);
        }
    }

    Ok(())
}
