use clap::Parser;
use env_logger::Env;
use log::{error, info};
use protocol::{ServerInfo, DEFAULT_PORT};
use responder::network::Responder;
use std::sync::Arc;

/// Parses `major.minor.patch`.
fn parse_version(s: &str) -> Result<(u8, u8, u8), String> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 3 {
        return Err(format!("expected major.minor.patch, got '{}'", s));
    }

    let mut numbers = [0u8; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{}' is not a number between 0 and 255", part))?;
    }

    Ok((numbers[0], numbers[1], numbers[2]))
}

/// Main-method of the responder.
/// Parses command-line arguments, binds the socket and answers probes until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[clap(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Advertised server name
        #[clap(short, long, default_value = "Test Server")]
        name: String,
        /// Advertised server version (major.minor.patch)
        #[clap(long = "server-version", default_value = "0.1.0", value_parser = parse_version)]
        server_version: (u8, u8, u8),
        /// Advertised player count
        #[clap(long, default_value = "0")]
        players: u8,
        /// Advertised player limit
        #[clap(short, long, default_value = "32")]
        max_players: u8,
        /// Probability of ignoring a probe, simulating packet loss
        #[clap(short, long, default_value = "0.0")]
        drop_rate: f64,
    }

    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let args = Args::parse();

    let (major, minor, patch) = args.server_version;
    let info = ServerInfo::new(major, minor, patch, args.players, args.max_players, args.name);
    info!("Advertising {}", info);

    let address = format!("{}:{}", args.host, args.port);
    let responder = Arc::new(Responder::bind(&address, info, args.drop_rate).await?);

    let server_handle = {
        let responder = Arc::clone(&responder);
        tokio::spawn(async move { responder.run().await })
    };

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("Responder failed: {}", e),
                Err(e) => error!("Responder task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            let counters = responder.counters();
            info!(
                "Received Ctrl+C, shutting down ({} pings, {} polls answered, {} dropped)",
                counters.pings(),
                counters.polls(),
                counters.dropped()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("0.1.4"), Ok((0, 1, 4)));
        assert_eq!(parse_version("255.255.255"), Ok((255, 255, 255)));
        assert!(parse_version("1.2").is_err());
        assert!(parse_version("1.2.3.4").is_err());
        assert!(parse_version("1.256.0").is_err());
        assert!(parse_version("a.b.c").is_err());
    }
}
