use std::net::SocketAddr;
use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use geostore::store::DEFAULT_ADDR;
use geostore::{GeoService, Ingest, Latest, ManagedStoreClient, Result, StoreConfig};

#[derive(Parser)]
#[command(name = "geostore-client", version, about = "Record and query entity positions")]
struct Cli {
    /// Store server address
    #[arg(long, global = true, default_value = DEFAULT_ADDR, value_name = "IP-PORT")]
    addr: SocketAddr,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a position, e.g. `ingest truck-7 '[-26.13, -46.31]'`
    Ingest {
        /// The entity id
        item_id: String,
        /// JSON array `[lat, lng]`
        coordinates: String,
    },
    /// Print the latest positions of an entity, newest first
    Latest {
        /// The entity id
        item_id: String,
    },
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => exit(code),
        Err(e) => {
            eprintln!("{}", e);
            exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let client = ManagedStoreClient::new(StoreConfig::new(cli.addr));
    client.connect()?;
    let service = GeoService::new(Arc::new(client));

    let code = match cli.command {
        Commands::Ingest {
            item_id,
            coordinates,
        } => {
            // Unparseable input is validated like any other bad body.
            let coordinates = serde_json::from_str(&coordinates).unwrap_or(Value::Null);
            match service.ingest(&item_id, &coordinates)? {
                Ingest::Accepted(_) => 0,
                Ingest::Rejected(rejection) => {
                    eprintln!("{}", rejection);
                    1
                }
            }
        }
        Commands::Latest { item_id } => match service.query_latest(&item_id)? {
            Latest::Positions(positions) => {
                println!("{}", serde_json::to_string(&positions)?);
                0
            }
            Latest::Rejected(rejection) => {
                eprintln!("{}", rejection);
                1
            }
        },
    };

    service.store().disconnect()?;
    Ok(code)
}
