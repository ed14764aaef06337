//! UDP transport to upstream nameservers.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::error;

use crate::cache::SocketCache;

/// Upstream replies are read into a buffer of this size; anything larger is
/// truncated by the kernel and will fail to decode. Known constraint: EDNS
/// responses above this limit are not supported.
pub const MAX_DATAGRAM_LEN: usize = 600;

const DNS_PORT: u16 = 53;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can perform one query/response exchange with a nameserver.
/// An empty reply means the server could not be reached; the resolver decides
/// what to do about it. Implemented by [`UpstreamTransport`] for real I/O and
/// by scripted stand-ins in tests.
pub trait Exchanger: Send + Sync {
    fn exchange(
        &self,
        payload: &[u8],
        server: Ipv4Addr,
    ) -> impl Future<Output = Vec<u8>> + Send;
}

/// Sends queries over connected UDP sockets, reusing the cached socket for
/// root servers and opening a throwaway socket per attempt for everything
/// else. No retries happen here; picking a different server is the
/// resolver's job.
pub struct UpstreamTransport {
    cache: Arc<SocketCache>,
    port: u16,
    attempt_timeout: Duration,
}

impl UpstreamTransport {
    pub fn new(cache: Arc<SocketCache>) -> Self {
        Self {
            cache,
            port: DNS_PORT,
            attempt_timeout: ATTEMPT_TIMEOUT,
        }
    }

    /// Transport with a non-standard port and timeout, for exercising the
    /// code against local sockets.
    pub fn with_settings(cache: Arc<SocketCache>, port: u16, attempt_timeout: Duration) -> Self {
        Self {
            cache,
            port,
            attempt_timeout,
        }
    }

    /// Opens one connected socket per root server and stores it in the
    /// cache. Called once at startup.
    pub async fn warm_cache(&self) -> Result<()> {
        for &addr in self.cache.roots() {
            let socket = self.connect(addr).await?;
            self.cache.put(addr, Arc::new(socket)).await;
        }
        Ok(())
    }

    async fn connect(&self, addr: Ipv4Addr) -> std::io::Result<UdpSocket> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect((addr, self.port)).await?;
        Ok(socket)
    }

    /// Sends `payload` to `server` and waits for a single reply datagram.
    /// Returns an empty buffer on timeout or socket error. An erroring
    /// cached socket is evicted so the next use connects a fresh one.
    pub async fn query_upstream(&self, payload: &[u8], server: Ipv4Addr) -> Vec<u8> {
        let (socket, cached) = match self.cache.get(server).await {
            Some(socket) => (socket, true),
            None => match self.connect(server).await {
                Ok(socket) => {
                    let socket = Arc::new(socket);
                    if self.cache.is_root(server) {
                        // root whose socket was evicted after an earlier
                        // failure; re-cache the replacement
                        self.cache.put(server, socket.clone()).await;
                        (socket, true)
                    } else {
                        (socket, false)
                    }
                }
                Err(e) => {
                    error!("Failed to open socket to upstream {server}: {e}");
                    return Vec::new();
                }
            },
        };

        if let Err(e) = socket.send(payload).await {
            error!("Socket error while sending to {server}: {e}");
            if cached {
                self.cache.delete(server).await;
            }
            return Vec::new();
        }

        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        match timeout(self.attempt_timeout, socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                buf
            }
            Ok(Err(e)) => {
                error!("Socket error while receiving from {server}: {e}");
                if cached {
                    self.cache.delete(server).await;
                }
                Vec::new()
            }
            Err(_) => {
                error!("Timed out, could not complete lookup on {server}");
                if cached {
                    self.cache.delete(server).await;
                }
                Vec::new()
            }
        }
        // a non-cached socket closes when it drops here
    }
}

impl Exchanger for UpstreamTransport {
    async fn exchange(&self, payload: &[u8], server: Ipv4Addr) -> Vec<u8> {
        self.query_upstream(payload, server).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Binds a local nameserver stand-in that answers every datagram after
    /// ignoring the first `ignore` of them.
    async fn spawn_responder(ignore: usize) -> (Ipv4Addr, u16) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = socket.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_LEN];
            let mut seen = 0usize;
            while let Ok((_, src)) = socket.recv_from(&mut buf).await {
                seen += 1;
                if seen > ignore {
                    let _ = socket.send_to(b"reply", src).await;
                }
            }
        });
        (Ipv4Addr::LOCALHOST, port)
    }

    #[tokio::test]
    async fn test_non_root_upstream_is_not_cached() {
        let (addr, port) = spawn_responder(0).await;
        let cache = Arc::new(SocketCache::new(Vec::new()));
        let transport =
            UpstreamTransport::with_settings(cache.clone(), port, Duration::from_secs(1));

        let reply = transport.query_upstream(b"ping", addr).await;
        assert_eq!(reply, b"reply");
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_timeout_returns_empty_and_evicts_root() {
        let (addr, port) = spawn_responder(1).await;
        let cache = Arc::new(SocketCache::new(vec![addr]));
        let transport =
            UpstreamTransport::with_settings(cache.clone(), port, Duration::from_millis(100));
        transport.warm_cache().await.unwrap();
        assert_eq!(cache.len().await, 1);

        // first attempt is swallowed by the responder: timeout, eviction
        let reply = transport.query_upstream(b"ping", addr).await;
        assert!(reply.is_empty());
        assert_eq!(cache.len().await, 0);

        // next use connects a replacement and re-caches it
        let reply = transport.query_upstream(b"ping", addr).await;
        assert_eq!(reply, b"reply");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_cached_root_socket_is_reused() {
        let (addr, port) = spawn_responder(0).await;
        let cache = Arc::new(SocketCache::new(vec![addr]));
        let transport =
            UpstreamTransport::with_settings(cache.clone(), port, Duration::from_secs(1));
        transport.warm_cache().await.unwrap();

        let warmed = cache.get(addr).await.unwrap();
        assert_eq!(transport.query_upstream(b"ping", addr).await, b"reply");
        let after = cache.get(addr).await.unwrap();
        assert!(Arc::ptr_eq(&warmed, &after));
    }
}
