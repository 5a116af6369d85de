//! # Game Server Responder
//!
//! A small stand-in for a game server's status port. It answers the two
//! probes a server watcher sends:
//!
//! - `GOp` pings are answered with `GOp` followed by the protocol version,
//!   which the watcher uses to measure round trip time.
//! - `GOi` info polls are answered with the version, player counts and name
//!   currently advertised.
//!
//! The advertised info can be changed while running, and a drop rate can be
//! configured to simulate packet loss. Anything else arriving on the socket
//! is ignored.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use protocol::ServerInfo;
//! use responder::network::Responder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let info = ServerInfo::new(0, 1, 4, 0, 32, "Local Test Server");
//!     let responder = Responder::bind("0.0.0.0:28970", info, 0.0).await?;
//!     responder.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
