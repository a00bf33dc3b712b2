use std::io::BufWriter;
use std::io::Write;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use crossbeam::channel;
use log::{debug, error, info};
use serde_json::Deserializer;

use crate::common::{Reply, Request, Response};
use crate::engines::ListEngine;
use crate::thread_pool::ThreadPool;
use crate::{GeoError, Result};

/// The network-attached key/list store.
///
/// Generic over both the storage engine `E` and the thread pool `P`.
/// Every connection gets its own reader thread, so idle clients never hold a
/// pool worker; the pool only runs the engine work of each request.
/// Each connection owns its own watch state, so `WATCH`/`EXEC` pairs from
/// different clients never see each other.
pub struct StoreServer<E: ListEngine, P: ThreadPool> {
    engine: E,
    pool: Arc<P>,
}

impl<E, P> StoreServer<E, P>
where
    E: ListEngine,
    P: ThreadPool + Send + Sync + 'static,
{
    /// Creates a `StoreServer` with a given storage engine and thread pool.
    pub fn new(engine: E, pool: P) -> Self {
        Self {
            engine,
            pool: Arc::new(pool),
        }
    }

    /// Binds to `addr` and serves connections until the listener fails.
    pub fn run(&self, addr: impl ToSocketAddrs) -> Result<()> {
        self.serve(TcpListener::bind(addr)?)
    }

    /// Serves connections from an already-bound listener.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("Accepting connections on {}", listener.local_addr()?);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let engine = self.engine.clone();
                    let pool = Arc::clone(&self.pool);
                    let spawned = thread::Builder::new()
                        .name("geostore-conn".to_owned())
                        .spawn(move || {
                            if let Err(e) = handle_connection(engine, pool, stream) {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    if let Err(e) = spawned {
                        error!("Could not spawn connection thread: {}", e);
                    }
                }
                Err(e) => error!("Connection failed: {}", e),
            }
        }

        Ok(())
    }
}

/// Handles a single client connection.
fn handle_connection<E, P>(engine: E, pool: Arc<P>, stream: TcpStream) -> Result<()>
where
    E: ListEngine,
    P: ThreadPool,
{
    let peer_addr = stream.peer_addr()?;
    debug!("Accepted connection from {}", peer_addr);

    let reader = &stream;
    let mut writer = BufWriter::new(&stream);
    let requests = Deserializer::from_reader(reader).into_iter::<Request>();
    let mut watched: Vec<(String, u64)> = Vec::new();

    for request in requests {
        let request = request?;
        debug!("Received request from {}: {:?}", peer_addr, request);

        let (still_watched, result) = dispatch(&engine, &*pool, watched, request)?;
        watched = still_watched;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!("Request from {} failed: {}", peer_addr, e);
                Response::Err(e.to_string())
            }
        };

        serde_json::to_writer(&mut writer, &response)?;
        writer.flush()?;
    }

    debug!("Connection from {} closed", peer_addr);
    Ok(())
}

type Handled = (Vec<(String, u64)>, Result<Response>);

/// Runs one request on the pool and waits for its response.
fn dispatch<E, P>(
    engine: &E,
    pool: &P,
    mut watched: Vec<(String, u64)>,
    request: Request,
) -> Result<Handled>
where
    E: ListEngine,
    P: ThreadPool,
{
    let (tx, rx) = channel::bounded::<Handled>(1);
    let engine = engine.clone();
    pool.spawn(move || {
        let response = handle_request(&engine, &mut watched, request);
        let _ = tx.send((watched, response));
    });
    rx.recv()
        .map_err(|_| GeoError::StringError("Worker dropped the request".to_owned()))
}

fn handle_request<E: ListEngine>(
    engine: &E,
    watched: &mut Vec<(String, u64)>,
    request: Request,
) -> Result<Response> {
    let response = match request {
        Request::Ping => Response::Pong,
        Request::Command(command) => Response::Reply(engine.apply(command)?),
        Request::Watch { key } => {
            let version = engine.version(key.clone())?;
            watched.push((key, version));
            Response::Reply(Reply::Ok)
        }
        Request::Unwatch => {
            watched.clear();
            Response::Reply(Reply::Ok)
        }
        Request::Exec { commands } => match engine.exec(std::mem::take(watched), commands)? {
            Some(replies) => Response::Batch(replies),
            None => Response::Aborted,
        },
    };
    Ok(response)
}
