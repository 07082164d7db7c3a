//! Moving objects and refs between repositories
//!
//! - `pkt_line`: length-prefixed framing shared by every message
//! - `pack`: the object container sent in both directions
//! - `protocol`: service requests, ref advertisements, negotiation and push reports
//! - `negotiation`: object graph walks deciding what a transfer carries
//! - `server`: upload-pack and receive-pack over any byte stream
//! - `client`: remote URLs and the requesting side of a conversation
//! - `daemon`: TCP listener for `bit://` remotes
//! - `credentials`: what the client presents to a daemon

pub mod client;
pub mod credentials;
pub mod daemon;
pub mod negotiation;
pub mod pack;
pub mod pkt_line;
pub mod protocol;
pub mod server;
