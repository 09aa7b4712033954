//! Connection and request/response multiplexing for a length-prefixed
//! trading gateway protocol.
//!
//! This crate owns the transport-level concerns of talking to the
//! gateway: the handshake, wire framing, per-request-class ID allocation
//! and rate limiting, and the lifecycle of a single request from write to
//! its last reply (or cancellation). It knows nothing about what any
//! particular request or reply *means* — that's a codec crate's job,
//! built on top of [`Request`] and [`wire::Message`].
//!
//! Start with [`Connection::connect`].

#![deny(missing_debug_implementations)]
#![warn(clippy::all)]

mod config;
mod error;
mod handshake;
mod lifecycle;
mod limiter;
mod receiver;
mod request;
mod supervisor;
mod wire;
mod writer;

pub use crate::config::GatewayConfig;
pub use crate::error::{GwError, GwResult, ProtocolError};
pub use crate::handshake::HandshakeInfo;
pub use crate::lifecycle::{Reply, RequestHandle};
pub use crate::request::{ReplyCount, Request, RequestKind};
pub use crate::supervisor::{keep_alive, Connection};
pub use crate::wire::{codes, Message, Session};

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handshake_info", self.handshake_info())
            .finish_non_exhaustive()
    }
}
