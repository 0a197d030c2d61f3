//! Bridges a duplex Unix socket to the host's playback and capture devices.
//!
//! One peer at a time exchanges tagged PCM frames with the server: `0x01`
//! frames are played, captured audio comes back as `0x02` frames.

pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::Config;
pub use error::{BridgeError, Result};
pub use server::{BridgeServer, ServerState};
