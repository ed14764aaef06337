//! Process-wide cache of connected sockets for the root nameservers.

use std::net::Ipv4Addr;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Maps a root-server address to a connected UDP socket. Sockets for
/// transient authoritative servers are never inserted here; the map stays
/// bounded by the root list. Reads vastly outnumber writes (writes happen at
/// warm-up and when a root socket is replaced after an error).
pub struct SocketCache {
    entries: RwLock<FxHashMap<Ipv4Addr, Arc<UdpSocket>>>,
    roots: Vec<Ipv4Addr>,
}

impl SocketCache {
    pub fn new(roots: Vec<Ipv4Addr>) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::with_capacity_and_hasher(
                roots.len(),
                Default::default(),
            )),
            roots,
        }
    }

    pub fn roots(&self) -> &[Ipv4Addr] {
        &self.roots
    }

    pub fn is_root(&self, addr: Ipv4Addr) -> bool {
        self.roots.contains(&addr)
    }

    pub async fn get(&self, addr: Ipv4Addr) -> Option<Arc<UdpSocket>> {
        self.entries.read().await.get(&addr).cloned()
    }

    pub async fn put(&self, addr: Ipv4Addr, socket: Arc<UdpSocket>) {
        self.entries.write().await.insert(addr, socket);
    }

    pub async fn delete(&self, addr: Ipv4Addr) {
        self.entries.write().await.remove(&addr);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_socket() -> Arc<UdpSocket> {
        Arc::new(UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap())
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let addr = Ipv4Addr::new(198, 41, 0, 4);
        let cache = SocketCache::new(vec![addr]);
        assert!(cache.get(addr).await.is_none());

        cache.put(addr, loopback_socket().await).await;
        assert!(cache.get(addr).await.is_some());
        assert_eq!(cache.len().await, 1);

        cache.delete(addr).await;
        assert!(cache.get(addr).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_root_membership() {
        let root = Ipv4Addr::new(198, 41, 0, 4);
        let cache = SocketCache::new(vec![root]);
        assert!(cache.is_root(root));
        assert!(!cache.is_root(Ipv4Addr::new(10, 0, 0, 1)));
    }
}
