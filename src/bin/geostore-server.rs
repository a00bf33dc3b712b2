use std::env::current_dir;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, ValueEnum};
use log::{error, info};

use geostore::store::DEFAULT_ADDR;
use geostore::{
    ListEngine, MemoryEngine, RayonThreadPool, Result, SharedQueueThreadPool, SledEngine,
    StoreServer, ThreadPool,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    /// Keep everything in memory
    Memory,
    /// Persist to a sled database in the data directory
    Sled,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Pool {
    /// Shared job queue
    Shared,
    /// rayon work-stealing pool
    Rayon,
}

#[derive(Parser)]
#[command(name = "geostore-server", version, about = "A networked key/list store")]
struct Cli {
    /// Server listening address
    #[arg(long, default_value = DEFAULT_ADDR, value_name = "IP-PORT")]
    addr: SocketAddr,

    /// Storage engine
    #[arg(long, value_enum, default_value_t = Engine::Memory)]
    engine: Engine,

    /// Directory for the sled engine (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Thread pool implementation
    #[arg(long, value_enum, default_value_t = Pool::Shared)]
    pool: Pool,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(long)]
    threads: Option<u32>,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let threads = cli.threads.unwrap_or(num_cpus::get() as u32);

    info!("geostore-server {}", env!("CARGO_PKG_VERSION"));
    info!("Storage engine: {:?}, pool: {:?} x {}", cli.engine, cli.pool, threads);
    info!("Listening on {}", cli.addr);

    match cli.engine {
        Engine::Memory => run_with_pool(MemoryEngine::new(), cli.pool, threads, cli.addr),
        Engine::Sled => {
            let dir = match cli.data_dir {
                Some(dir) => dir,
                None => current_dir()?,
            };
            info!("Data directory: {}", dir.display());
            run_with_pool(SledEngine::new(sled::open(dir)?)?, cli.pool, threads, cli.addr)
        }
    }
}

fn run_with_pool<E: ListEngine>(
    engine: E,
    pool: Pool,
    threads: u32,
    addr: SocketAddr,
) -> Result<()> {
    match pool {
        Pool::Shared => run_with_engine(engine, SharedQueueThreadPool::new(threads)?, addr),
        Pool::Rayon => run_with_engine(engine, RayonThreadPool::new(threads)?, addr),
    }
}

fn run_with_engine<E, P>(engine: E, pool: P, addr: SocketAddr) -> Result<()>
where
    E: ListEngine,
    P: ThreadPool + Send + Sync + 'static,
{
    let server = StoreServer::new(engine, pool);
    server.run(addr)
}
