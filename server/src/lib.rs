//! # Lobby Game Server Library
//!
//! This library provides the server side of the text-line lobby game: it
//! accepts TCP connections, registers users, groups them into lobbies and
//! drives the turn-based bike race they play together.
//!
//! ## Core Responsibilities
//!
//! ### Session Handling
//! Every accepted connection gets its own session task that reads
//! newline-delimited protocol lines, dispatches them and queues replies on
//! a per-connection outbound channel. All failures are isolated to the
//! connection they happen on.
//!
//! ### Shared State
//! The user registry and the lobby manager are constructed once and handed
//! to every session behind `Arc<RwLock<_>>`; there is no process-global
//! state. Broadcasts snapshot their recipients under the lock and send
//! after releasing it.
//!
//! ### Liveness
//! A per-connection prober sends PING on a fixed interval and force-closes
//! the connection when the PONG deadline passes, running the same cleanup
//! as an explicit QUIT.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! User ids, nickname uniqueness with numeric de-collision, rename
//! validation and the per-user outbound senders.
//!
//! ### Board Module (`board`)
//! The data-driven field graph, per-player boards with selection chaining
//! and the per-turn dice color credits.
//!
//! ### Lobby Module (`lobby`)
//! Lobby lifecycle and membership (max 4, host privileges), turn rotation,
//! winner tracking and the start/restart contracts.
//!
//! ### Liveness Module (`liveness`)
//! The Idle -> AwaitingPong -> (Idle | TimedOut) heartbeat state machine
//! and its per-connection prober task.
//!
//! ### Session Module (`session`)
//! The per-connection read loop, the verb dispatcher and the common
//! cleanup path.
//!
//! ### Net Module (`net`)
//! The TCP listener; binding it is the only fatal startup error.
//!
//! ### Highscore Module (`highscore`)
//! The seam to the persistence collaborator: finished games are reported
//! with their podium in order.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::liveness::ProbeConfig;
//! use server::net::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080", ProbeConfig::default()).await?;
//!     // Runs the accept loop which spawns one session per connection,
//!     // each with its own liveness prober.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod highscore;
pub mod liveness;
pub mod lobby;
pub mod net;
pub mod registry;
pub mod session;
