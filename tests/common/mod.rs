#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use geostore::{
    GeoService, ListEngine, ManagedStoreClient, MemoryEngine, SharedQueueThreadPool, SledEngine,
    StoreConfig, StoreServer, ThreadPool,
};
use tempfile::TempDir;

/// Starts an in-memory store server on an ephemeral port.
///
/// The server thread runs until the test process exits.
pub fn start_server() -> SocketAddr {
    start_server_with(MemoryEngine::new(), 16)
}

/// Starts a store server over `engine` with a pool of `threads` workers.
pub fn start_server_with<E: ListEngine>(engine: E, threads: u32) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let pool = SharedQueueThreadPool::new(threads).expect("thread pool");
    let server = StoreServer::new(engine, pool);
    thread::spawn(move || server.serve(listener));
    addr
}

/// Starts a sled-backed store server. Keep the directory alive for the test.
pub fn start_sled_server() -> (SocketAddr, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let db = sled::open(dir.path()).expect("open sled");
    let engine = SledEngine::new(db).expect("sled engine");
    (start_server_with(engine, 4), dir)
}

pub fn connected_client(config: StoreConfig) -> Arc<ManagedStoreClient> {
    let client = ManagedStoreClient::new(config);
    client.connect().expect("connect to store server");
    Arc::new(client)
}

pub fn service_on(addr: SocketAddr) -> GeoService<ManagedStoreClient> {
    GeoService::new(connected_client(StoreConfig::new(addr)))
}

/// An address nothing listens on.
pub fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr")
}
