use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use bridge_hostd::cli::{Cli, Command};
use bridge_hostd::config::HostConfig;
use bridge_hostd::host::{self, Host};
use bridge_hostd::lock::{InstanceLock, LockError};
use bridge_provider::{HealthStatus, InferenceProvider, OllamaProvider};
use bridge_transport::IrohListener;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bridge_hostd=info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(run(cli.command))
}

async fn run(command: Command) -> ExitCode {
    match command {
        Command::Start => run_start().await,
        Command::CopyServerId | Command::ShowQr => {
            // No running instance to ask in this process; these are only
            // meaningful against a live host's console (spec §6's
            // commands are typed there while `start` is in the foreground).
            println!("no running instance in this process; use the console of a running `start`");
            ExitCode::from(0)
        }
        Command::Stop | Command::SelectModel { .. } | Command::ToggleDebug | Command::Quit => {
            println!("type this command into the console of a running `bridge-hostd start`");
            ExitCode::from(0)
        }
    }
}

async fn run_start() -> ExitCode {
    let lock = match InstanceLock::acquire(InstanceLock::default_path()) {
        Ok(lock) => lock,
        Err(LockError::AlreadyRunning(path)) => {
            error!(path = %path, "another instance is already running");
            return ExitCode::from(2);
        }
        Err(e) => {
            error!(error = %e, "failed to acquire instance lock");
            return ExitCode::from(1);
        }
    };

    match try_run_start().await {
        Ok(()) => {
            drop(lock);
            ExitCode::from(0)
        }
        Err(e) => {
            error!(error = %e, "fatal startup failure");
            drop(lock);
            ExitCode::from(1)
        }
    }
}

async fn try_run_start() -> anyhow::Result<()> {
    let config = HostConfig::from_env();
    info!(host = %config.host_name, model = %config.model, "starting inference bridge host");

    let provider: Arc<dyn InferenceProvider> = Arc::new(OllamaProvider::new(config.ollama_url.clone()));

    match provider.health().await {
        HealthStatus::Ok => info!("inference provider is reachable"),
        HealthStatus::Unreachable(message) => {
            anyhow::bail!("inference provider unreachable at startup: {message}");
        }
    }

    let listener = IrohListener::bind_with_seed(config.bind_topic_seed.as_ref().map(|s| s.as_bytes()))
        .await
        .context("failed to bind transport")?;
    let server_id = listener.endpoint().id();
    let topic = bridge_transport::Topic::from_bytes(*server_id.as_bytes());
    info!(server_id = %topic, "listening for peers");

    let host = Arc::new(Host::new(&config, provider));
    let listener: Arc<dyn bridge_transport::PeerListener> = Arc::new(listener);

    let (debug_enabled_tx, _debug_enabled_rx) = mpsc::unbounded_channel();

    let serve_host = host.clone();
    let serve_listener = listener.clone();
    let serve_task = tokio::spawn(async move { serve_host.serve(serve_listener).await });

    let console_host = host.clone();
    let console_task = tokio::spawn(async move {
        console_host.run_console(topic, debug_enabled_tx).await;
    });

    tokio::select! {
        () = host::shutdown_signal() => {
            info!("shutting down");
            host.shutdown().await;
        }
        _ = console_task => {
            info!("console closed, shutting down");
            host.shutdown().await;
        }
    }

    serve_task.abort();
    Ok(())
}
