use thiserror::Error;

/// A protocol-level error reported by the gateway itself (an `ERR_MSG` frame).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("gateway error {code}: {message}")]
pub struct ProtocolError {
    /// The gateway's own error code, copied verbatim from the wire.
    pub code: i32,
    /// Human-readable error text, copied verbatim from the wire.
    pub message: String,
    /// The request ID the error was addressed to, if any (`-1` on the wire
    /// means "no request", surfaced here as `None`).
    pub req_id: Option<i64>,
}

/// The single error type returned by every fallible operation in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GwError {
    /// An order-submission request was attempted on a read-only client.
    #[error("client is read-only, order requests are disabled")]
    Readonly,

    /// A `Request::kind()` returned a kind the core does not know how to
    /// route.
    #[error("unknown or unsupported request kind")]
    BadRequestType,

    /// The registry already held an entry for this request ID.
    ///
    /// This should be unreachable if the ID limiter is sound; it is
    /// surfaced rather than panicking because it indicates an internal
    /// invariant breach, not a recoverable caller error.
    #[error("request id {id} is already registered")]
    DuplicateReqId {
        /// The ID that collided.
        id: i64,
    },

    /// A socket read or write failed.
    #[error("i/o error communicating with the gateway")]
    Io(#[from] std::io::Error),

    /// No reply arrived for a single-reply request within its deadline.
    #[error("timed out waiting for the gateway's first reply")]
    Timeout,

    /// The gateway responded with an `ERR_MSG` frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `cancel()` was called on a request whose kind is not cancelable.
    #[error("this request cannot be canceled")]
    NotCancelable,

    /// `cancel()` was called after the request had already terminated.
    #[error("request has already finished")]
    AlreadyFinished,

    /// The connection handshake failed or timed out.
    #[error("handshake with the gateway failed")]
    Handshake(#[source] Box<GwError>),

    /// The connection is down; no further requests can be issued until a
    /// reconnect succeeds.
    #[error("connection to the gateway is down")]
    Disconnected,
}

/// Abbreviation of `Result<T, GwError>`.
pub type GwResult<T> = std::result::Result<T, GwError>;
