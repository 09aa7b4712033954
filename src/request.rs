//! The caller-facing contract for a single request to the gateway.

/// Which disjoint ID space and rate-limiter class a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Fire-and-forget or gateway-state-wide requests (e.g. a cancel) that
    /// always use ID `0` and never expect a correlated reply.
    Static,
    /// Market-data-style requests, keyed by a ticker ID.
    Ticker,
    /// Order placement/modification, keyed by an order ID.
    Order,
    /// Historical-data requests. Draws from the ticker ID space but is not
    /// subject to the order read-only guard.
    Historical,
}

/// How many reply messages a request expects, and how to recognize the end
/// of a multi-message stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCount {
    /// No reply is ever correlated to this request's ID.
    Zero,
    /// Exactly one reply ends the request.
    One,
    /// An open-ended stream of replies, terminated either by a specific
    /// sentinel wire code or left open until the caller cancels it.
    Many {
        /// A wire code that, when seen, is the stream's last message.
        /// `None` means the stream only ever ends via cancellation.
        end_code: Option<i32>,
    },
}

/// A request the core can write to the wire and, if applicable, route
/// replies back for.
///
/// Implementations live in a codec crate; the core only needs enough to
/// route bytes — it never interprets a request's own field values.
pub trait Request: Send + 'static {
    /// Which ID space and limiter class this request belongs to.
    fn kind(&self) -> RequestKind;

    /// How many replies to expect, and how to recognize the stream's end.
    fn reply_count(&self) -> ReplyCount;

    /// Whether an in-flight request of this kind can be canceled via
    /// [`Request::write_cancel`].
    fn cancelable(&self) -> bool {
        false
    }

    /// Serializes the complete frame body — including the leading code and
    /// `req_id` fields — into `out`. The core only frames (length-prefixes)
    /// and writes what ends up here; it never inspects or adds to it.
    fn write_body(&self, out: &mut Vec<u8>, req_id: i64, server_version: i64);

    /// Serializes the complete cancel frame body, if cancelable.
    ///
    /// The default panics because the core only calls this after checking
    /// [`Request::cancelable`] returned `true`; a `Request` that returns
    /// `true` there must override this method.
    fn write_cancel(&self, _out: &mut Vec<u8>, _req_id: i64) {
        unreachable!("write_cancel called on a non-cancelable request");
    }
}
