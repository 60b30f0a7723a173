//! audiencegate — audience-filtering sidecar proxy for MCP servers.
//!
//! Listens for plain HTTP, forwards every request to the configured
//! upstream, and filters capability-list responses by audience while they
//! stream back. Run it next to the MCP server and point clients at the gate.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, warn};

use audiencegate::config::GateConfig;
use audiencegate::policy::load_manifest;
use audiencegate::proxy::service::log_startup;
use audiencegate::proxy::GateService;

/// Command-line configuration for the gate.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "AUDIENCEGATE_PORT", default_value = "4242")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Upstream MCP server URL (http only), e.g. "http://mcp-server:8080"
    #[arg(long, env = "AUDIENCEGATE_UPSTREAM_URL")]
    upstream_url: String,

    /// Path to the audience manifest (YAML)
    #[arg(long, env = "AUDIENCEGATE_MANIFEST")]
    manifest: PathBuf,

    /// Graceful shutdown timeout in seconds
    #[arg(long, env = "AUDIENCEGATE_SHUTDOWN_TIMEOUT", default_value = "30")]
    shutdown_timeout: u64,
}

/// Counts in-flight connections for graceful shutdown draining.
#[derive(Clone)]
struct ConnectionTracker {
    active: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = GateConfig::from_env();

    let policy = match load_manifest(&cli.manifest) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, manifest = %cli.manifest.display(), "failed to load audience manifest");
            return Err(e.into());
        }
    };

    let upstream: http::Uri = cli.upstream_url.parse()?;
    let gate = GateService::new(upstream.clone(), Arc::clone(&policy), config.clone())?;
    log_startup(&upstream, &policy, &config);

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        shutdown_timeout = cli.shutdown_timeout,
        max_concurrent_connections = config.max_concurrent_connections,
        "audiencegate listening"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let tracker = ConnectionTracker::new();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_connections));

    let shutdown_on_sigint = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received SIGINT, initiating graceful shutdown");
                let _ = shutdown_on_sigint.send(());
            }
            Err(e) => error!(error = %e, "failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    {
        let shutdown_on_sigterm = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("received SIGTERM, initiating graceful shutdown");
                    let _ = shutdown_on_sigterm.send(());
                }
                Err(e) => error!(error = %e, "failed to listen for SIGTERM"),
            }
        });
    }

    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let permit = match semaphore.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => {
                                warn!(
                                    peer = %peer_addr,
                                    max = config.max_concurrent_connections,
                                    "rejected connection: connection limit reached"
                                );
                                continue;
                            }
                        };

                        if let Err(e) = configure_tcp_stream(&stream, &config) {
                            error!(error = %e, "failed to configure socket");
                        }

                        let gate = gate.clone();
                        let tracker = tracker.clone();
                        let mut conn_shutdown_rx = shutdown_tx.subscribe();

                        tracker.increment();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, peer_addr, gate, &mut conn_shutdown_rx).await
                            {
                                error!(error = %e, "connection handling error");
                            }
                            tracker.decrement();
                            drop(permit);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                }
            }

            _ = shutdown_rx.recv() => {
                info!("shutdown signal received, stopping new connections");
                break;
            }
        }
    }

    drain_connections(&tracker, Duration::from_secs(cli.shutdown_timeout)).await;
    Ok(())
}

/// Serve one accepted connection until it closes or shutdown fires.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    gate: GateService,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let io = TokioIo::new(stream);

    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
        let gate = gate.clone();
        async move {
            let result: Result<_, std::convert::Infallible> = match gate.handle(req).await {
                Ok(response) => Ok(response),
                Err(e) => {
                    error!(peer = %peer_addr, error = %e, "request failed");
                    Ok(e.to_response())
                }
            };
            result
        }
    });

    let builder = auto::Builder::new(hyper_util::rt::TokioExecutor::new());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    tokio::select! {
        result = &mut conn => {
            if let Err(e) = result {
                error!(error = %e, "connection error");
            }
        }
        _ = shutdown_rx.recv() => {
            info!("gracefully closing connection");
            conn.as_mut().graceful_shutdown();
            let _ = tokio::time::timeout(Duration::from_secs(5), conn).await;
        }
    }

    Ok(())
}

/// Wait for in-flight connections to finish, up to the shutdown deadline.
async fn drain_connections(tracker: &ConnectionTracker, deadline: Duration) {
    info!(
        active_connections = tracker.count(),
        timeout_seconds = deadline.as_secs(),
        "waiting for active connections to drain"
    );
    let start = std::time::Instant::now();

    while tracker.count() > 0 {
        if start.elapsed() >= deadline {
            warn!(
                active_connections = tracker.count(),
                "shutdown timeout reached, forcing exit"
            );
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }

    info!("all connections drained, shutting down cleanly");
}

/// Apply socket options from config.
fn configure_tcp_stream(stream: &TcpStream, config: &GateConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    let socket = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(config.tcp_keepalive());
    socket.set_tcp_keepalive(&keepalive)?;

    Ok(())
}
