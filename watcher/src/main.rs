use clap::Parser;
use log::{error, info, warn};
use protocol::DEFAULT_PORT;
use std::path::PathBuf;
use watcher::{FavoriteServers, ServerWatcher, StatusChange, StatusRow, WatcherConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server addresses to watch (host or host:port)
    servers: Vec<String>,

    /// JSON file with favorite servers; loaded on start, saved on exit
    #[arg(short = 'f', long)]
    favorites: Option<PathBuf>,

    /// Port used for addresses without a port suffix
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    default_port: u16,

    /// Ping interval in milliseconds
    #[arg(long, default_value = "100")]
    ping_interval: u64,

    /// Info poll interval in milliseconds (must exceed the ping interval)
    #[arg(long, default_value = "1000")]
    poll_interval: u64,

    /// Extra grace period in milliseconds before a silent server times out
    #[arg(short = 't', long, default_value = "2000")]
    timeout: u64,

    /// Print changes as JSON lines
    #[arg(long)]
    json: bool,
}

fn report(change: &StatusChange, json: bool) {
    let row = StatusRow::from(&*change.server);

    if json {
        match serde_json::to_string(&row) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to encode status row: {}", e),
        }
    } else {
        println!("{:<10} {}", format!("{:?}", change.kind), row);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = WatcherConfig::from_millis(
        args.default_port,
        args.ping_interval,
        args.poll_interval,
        args.timeout,
    )?;
    let watcher = ServerWatcher::new(config)?;

    if let Some(path) = &args.favorites {
        let favorites = FavoriteServers::load(path)?;
        info!(
            "Restoring {} favorite servers from {}",
            favorites.servers.len(),
            path.display()
        );
        favorites.restore_into(&watcher);
    }

    for address in &args.servers {
        if let Err(e) = watcher.add_server(address) {
            error!("Can not watch '{}': {}", address, e);
        }
    }

    if watcher.is_empty() {
        warn!("No servers to watch");
    }

    let mut changes = watcher.subscribe();
    watcher.start()?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            change = changes.recv() => {
                match change {
                    Some(change) => report(&change, args.json),
                    None => break,
                }
            }
            _ = &mut shutdown => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    watcher.stop();

    if let Some(path) = &args.favorites {
        FavoriteServers::from_watcher(&watcher).save(path)?;
        info!("Saved favorites to {}", path.display());
    }

    Ok(())
}
