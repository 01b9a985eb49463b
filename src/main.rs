use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use vestry::auth::SessionGate;
use vestry::site::SiteManager;
use vestry::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("VESTRY_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    vestry::observability::init(metrics_port);

    let port = std::env::var("VESTRY_PORT").unwrap_or_else(|_| "2180".into());
    let bind = std::env::var("VESTRY_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("VESTRY_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let password = std::env::var("VESTRY_PASSWORD").unwrap_or_else(|_| "vestry".into());
    let admin_password = std::env::var("VESTRY_ADMIN_PASSWORD").ok();
    let max_connections: usize = std::env::var("VESTRY_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let compact_threshold: u64 = std::env::var("VESTRY_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    let tls_cert = std::env::var("VESTRY_TLS_CERT").ok();
    let tls_key = std::env::var("VESTRY_TLS_KEY").ok();
    let tls_acceptor = vestry::tls::load_tls_acceptor(tls_cert.as_deref(), tls_key.as_deref())?;

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let sites = Arc::new(SiteManager::new(PathBuf::from(&data_dir), compact_threshold));
    let gate = Arc::new(SessionGate::new(password, admin_password));
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("vestry listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  max_connections: {max_connections}");
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(vestry::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(vestry::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(vestry::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let sites = sites.clone();
                let gate = gate.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    let result = match tls {
                        Some(acceptor) => match acceptor.accept(socket).await {
                            Ok(stream) => wire::process_connection(stream, sites, gate).await,
                            Err(e) => Err(e),
                        },
                        None => wire::process_connection(socket, sites, gate).await,
                    };
                    if let Err(e) = result {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(vestry::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    Ok(())
}
