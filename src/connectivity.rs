//! Internet reachability, used to fire the internet-available hook

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cloudflare DNS
pub const PROBE_ADDR: ([u8; 4], u16) = ([1, 1, 1, 1], 53);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Try a TCP connect to `addr`
pub async fn probe(addr: SocketAddr, timeout: Duration) -> bool {
    tokio::task::spawn_blocking(move || TcpStream::connect_timeout(&addr, timeout).is_ok())
        .await
        .unwrap_or(false)
}

pub async fn is_online() -> bool {
    probe(SocketAddr::from(PROBE_ADDR), PROBE_TIMEOUT).await
}

/// Probe every `interval` until `addr` answers. Returns false if cancelled first.
pub async fn wait_until_online(
    addr: SocketAddr,
    interval: Duration,
    cancel: &CancellationToken,
) -> bool {
    loop {
        let online = tokio::select! {
            _ = cancel.cancelled() => return false,
            online = probe(addr, PROBE_TIMEOUT) => online,
        };
        if online {
            return true;
        }
        tracing::debug!("{} unreachable, retrying in {:?}", addr, interval);

        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(probe(addr, Duration::from_secs(1)).await);
        assert!(wait_until_online(addr, Duration::from_millis(10), &CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        assert!(!probe(addr, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn({
            let cancel = cancel.clone();
            async move { wait_until_online(addr, Duration::from_secs(60), &cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        assert!(!waiter.await.unwrap());
    }
}
