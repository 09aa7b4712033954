//! Wire framing: length-prefixed frames of NUL-terminated fields.

pub mod codes;
mod frame;
mod message;

pub(crate) use frame::{FrameReader, FrameWriter};
pub(crate) use message::RoutingId;
pub use message::{Message, Session};
