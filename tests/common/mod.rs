use std::net::SocketAddr;
use std::sync::Arc;

use location_relay::{database::MemoryStore, server::serve};
use tokio::net::TcpListener;

/// Serve the relay on an ephemeral port, backed by a fresh in-memory store
pub async fn spawn_relay() -> (SocketAddr, Arc<MemoryStore>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");

    let store = Arc::new(MemoryStore::new());
    let served = store.clone();
    tokio::spawn(async move {
        serve(listener, served, std::future::pending())
            .await
            .expect("Relay server failed");
    });

    (addr, store)
}

pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}
