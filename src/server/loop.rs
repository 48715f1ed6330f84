// Server loop module
// Accepts connections until the process is asked to stop

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Accept connections until Ctrl-C
pub async fn run(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    run_until(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            logger::log_error(&format!("Failed to listen for shutdown signal: {e}"));
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Accept connections until `shutdown` completes.
///
/// Connections already being served keep running in their own tasks; only the
/// accept loop stops.
pub async fn run_until(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    let active_connections = Arc::new(AtomicUsize::new(0));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = &mut shutdown => {
                logger::log_shutdown();
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sandbox::{PathResolver, SandboxRoot};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_serves_range_over_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..100).collect();
        tokio::fs::write(dir.path().join("data.bin"), &data).await.unwrap();

        let mut config = Config::load_from("/nonexistent/mediashare-config").unwrap();
        config.logging.access_log = false;
        let resolver =
            PathResolver::new(vec![SandboxRoot::new("media", dir.path()).unwrap()]).unwrap();
        let state = Arc::new(AppState::with_resolver(&config, resolver));

        let listener = crate::server::create_reusable_listener("127.0.0.1:0".parse().unwrap())
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(run_until(listener, state, async move {
            let _ = stop_rx.await;
        }));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(
                b"GET /media/data.bin HTTP/1.1\r\nHost: localhost\r\nRange: bytes=10-19\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();

        let split = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8_lossy(&raw[..split]).to_lowercase();
        assert!(head.starts_with("http/1.1 206"));
        assert!(head.contains("content-range: bytes 10-19/100"));
        assert!(head.contains("content-length: 10"));
        assert_eq!(&raw[split + 4..], &data[10..20]);

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
