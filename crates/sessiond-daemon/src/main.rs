//! sessiond - Session Registry Daemon
//!
//! Front-end services (web, serial, remote-management) register interactive
//! login sessions with this daemon; it publishes each session as an
//! addressable object, enforces ownership and privilege rules on who may
//! terminate a session, and reclaims sessions whose owning process has
//! died.
//!
//! # Fork Safety
//!
//! Daemonization via `fork()` MUST occur BEFORE the tokio runtime starts:
//! `fork()` only duplicates the calling thread, so forking after worker
//! threads exist leaves mutexes locked forever in the child. This binary
//! therefore uses a synchronous `fn main()` that daemonizes first, then
//! manually constructs the runtime and enters `async_main`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use sessiond_core::config::ServiceConfig;
use sessiond_core::process::ProcfsProbe;
use sessiond_core::SessionRegistry;
use sessiond_daemon::bus::ObjectDirectory;
use sessiond_daemon::directory::SystemUserDirectory;
use sessiond_daemon::metrics::{new_shared_registry, SharedMetricsRegistry};
use sessiond_daemon::sweeper::LivenessSweeper;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// sessiond - session registry daemon
#[derive(Parser, Debug)]
#[command(name = "sessiond")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to service configuration file
    #[arg(short, long, default_value = "sessiond.toml")]
    config: PathBuf,

    /// Run in foreground (don't daemonize)
    #[arg(long)]
    no_daemon: bool,

    /// Path to PID file (overrides the config file)
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Port for the Prometheus metrics HTTP endpoint (overrides the config
    /// file)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Disable the Prometheus metrics HTTP endpoint
    #[arg(long)]
    no_metrics: bool,
}

/// Write the PID file, creating its parent directory if needed.
fn write_pid_file(pid_path: &PathBuf) -> Result<()> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create PID file directory")?;
    }
    std::fs::write(pid_path, std::process::id().to_string())
        .context("failed to write PID file")?;
    info!("PID file written to {:?}", pid_path);
    Ok(())
}

/// Remove the PID file, tolerating its absence.
fn remove_pid_file(pid_path: &PathBuf) {
    if pid_path.exists() {
        if let Err(e) = std::fs::remove_file(pid_path) {
            warn!("Failed to remove PID file: {e}");
        }
    }
}

/// Perform daemonization via the double-fork pattern.
///
/// # Safety
///
/// Must be called BEFORE any multi-threaded runtime is initialized; see the
/// crate-level doc. Returns `Ok(true)` if the caller is now the daemon
/// child, `Ok(false)` on platforms without fork.
#[allow(unsafe_code)] // fork() requires unsafe
fn daemonize() -> Result<bool> {
    #[cfg(unix)]
    {
        use nix::unistd::{fork, setsid, ForkResult};

        // SAFETY: called before the tokio runtime exists, so the process is
        // truly single-threaded and fork() is well-defined.
        match unsafe { fork() }? {
            ForkResult::Parent { .. } => {
                // Parent exits immediately - daemon continues in child.
                std::process::exit(0);
            },
            ForkResult::Child => {},
        }

        // Become session leader, losing the controlling terminal.
        setsid()?;

        // SAFETY: still single-threaded; the second fork guarantees the
        // daemon can never reacquire a controlling terminal.
        match unsafe { fork() }? {
            ForkResult::Parent { .. } => {
                std::process::exit(0);
            },
            ForkResult::Child => {},
        }

        // Avoid holding directory handles for the lifetime of the daemon.
        std::env::set_current_dir("/")?;

        Ok(true)
    }

    #[cfg(not(unix))]
    {
        Ok(false)
    }
}

/// Serve the Prometheus `/metrics` endpoint on localhost.
async fn serve_metrics(metrics: SharedMetricsRegistry, port: u16) -> Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = Arc::clone(&metrics);
            async move {
                match metrics.encode_text() {
                    Ok(body) => (StatusCode::OK, body),
                    Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
                }
            }
        }),
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind metrics endpoint")?;
    info!("Metrics endpoint listening on http://{addr}/metrics");
    axum::serve(listener, app)
        .await
        .context("metrics endpoint failed")
}

/// Synchronous entry point - handles daemonization BEFORE the runtime
/// starts, then constructs the runtime and runs [`async_main`].
fn main() -> Result<()> {
    let args = Args::parse();

    if !args.no_daemon {
        match daemonize() {
            Ok(true | false) => {},
            Err(e) => {
                // Tracing is not initialized yet.
                eprintln!("Daemonization failed: {e}");
                return Err(e);
            },
        }
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    runtime.block_on(async_main(args))
}

/// Async entry point - runs after daemonization is complete.
async fn async_main(args: Args) -> Result<()> {
    // Initialize logging.
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if args.no_daemon {
        info!("Running in foreground mode (--no-daemon)");
    } else {
        #[cfg(unix)]
        info!("Daemonized successfully");

        #[cfg(not(unix))]
        warn!("Daemonization not supported on this platform, running in foreground");
    }

    // Load configuration.
    let config = if args.config.exists() {
        ServiceConfig::from_file(&args.config).context("failed to load configuration")?
    } else {
        info!("No config file found at {:?}, using defaults", args.config);
        ServiceConfig::default()
    };

    let pid_path = args
        .pid_file
        .clone()
        .unwrap_or_else(|| config.daemon.pid_file.clone());
    write_pid_file(&pid_path)?;

    // Wire the registry: host account database for owner resolution and
    // privilege tiers, the in-process object directory as the bus-side
    // reflection.
    let user_directory = Arc::new(SystemUserDirectory::new(
        config.directory.admin_group.as_str(),
    ));
    let object_directory = Arc::new(ObjectDirectory::new());
    let registry = Arc::new(SessionRegistry::new(
        &config.registry.service_name,
        config.registry.base_path.clone(),
        user_directory,
        Arc::clone(&object_directory) as Arc<dyn sessiond_core::bus::BusPublisher>,
    ));

    info!(
        service = %config.registry.service_name,
        base_path = %config.registry.base_path,
        "Session registry initialized"
    );

    // Metrics endpoint.
    let metrics = if args.no_metrics {
        None
    } else {
        let metrics = new_shared_registry().context("failed to initialize metrics registry")?;
        let port = args.metrics_port.unwrap_or(config.daemon.metrics_port);
        let server_metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(server_metrics, port).await {
                warn!("Metrics endpoint terminated: {e}");
            }
        });
        Some(metrics)
    };

    // The liveness sweep runs for the life of the process.
    let mut sweeper = LivenessSweeper::new(
        Arc::clone(&registry),
        Arc::new(ProcfsProbe::new()),
        Duration::from_secs(config.registry.sweep_interval_secs),
    );
    if let Some(metrics) = metrics {
        sweeper = sweeper.with_metrics(metrics);
    }
    sweeper.spawn();

    info!(
        pid = std::process::id(),
        sweep_interval_secs = config.registry.sweep_interval_secs,
        "sessiond started"
    );

    // Wait for a termination signal.
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        _ = sigint.recv() => info!("SIGINT received, shutting down"),
    }

    // The registry is volatile; dropping the sessions on the way out keeps
    // the bus reflection clean for observers that outlive us.
    let dropped = registry.remove_all();
    if dropped > 0 {
        info!(dropped, "cleared session registry on shutdown");
    }
    remove_pid_file(&pid_path);

    info!("Shutdown complete");
    Ok(())
}
