//! Wire codes the core routes on directly.
//!
//! Every other code is opaque to the core: it is parsed far enough to
//! extract an ID and forwarded verbatim to whichever caller registered that
//! ID. Codec crates are free to define their own, much larger, code tables.

/// Server reports an error for a request (or `-1` for a connection-wide error).
pub const ERR_MSG: i32 = 4;

/// Carries the next valid order ID, delivered once during the handshake.
pub const NEXT_VALID_ID: i32 = 9;

/// Carries the comma-separated list of managed accounts, delivered once
/// during the handshake.
pub const MANAGED_ACCOUNTS: i32 = 15;

/// One contract-detail record in a contract-lookup stream, terminated by
/// [`CONTRACT_DATA_END`].
pub const CONTRACT_DATA: i32 = 10;

/// Sentinel ending a contract-detail stream (`RequestKind::Ticker`/`Static`
/// requests with `ReplyCount::Many { end_code: Some(CONTRACT_DATA_END) }`).
pub const CONTRACT_DATA_END: i32 = 52;

/// Tick-by-tick stream data; used as the example cancelable-stream code.
pub const TICK_BY_TICK: i32 = 99;

/// Outbound cancel frame for an in-flight tick-by-tick stream.
pub const CANCEL_TICK_BY_TICK: i32 = 98;

/// A small number of codes the Receiver drops entirely without routing
/// (heartbeats the gateway expects no correlation for).
pub const IGNORE: &str = "IGNORE";

/// Codes whose payload leads with a version field that must be skipped
/// before the request ID can be read.
///
/// This table is deliberately small and `pub(crate)`: codecs never need it,
/// since by the time a `Message` reaches a caller its cursor is already
/// positioned after code+id.
///
/// Open question: only the two handshake pushes are listed here.
/// `CONTRACT_DATA`/`CONTRACT_DATA_END` are *not* listed, i.e. this crate
/// assumes their request ID is the field immediately after the code, with
/// no leading version word — matching both the mock gateway this crate's
/// own tests drive and the contract-detail decoder in
/// `original_source/contract.go`, whose `ContractData.Read` starts reading
/// its body fields immediately with no version read first. That file only
/// shows what happens *after* routing, though: the dispatch table that
/// decides which codes skip a version word before the ID (`Message.open`
/// in the original client) was filtered out of the retrieved source, so
/// this assumption is unconfirmed against the original for these two
/// codes specifically — if a real gateway turns out to prefix them with a
/// version field, add them here.
pub(crate) fn has_leading_version(code: i32) -> bool {
    matches!(code, NEXT_VALID_ID | MANAGED_ACCOUNTS)
}

/// Codes carried on the reserved system ID (`-1`) rather than a per-request
/// ID — they never correlate to a live registry entry.
pub(crate) fn is_system_only(code: i32) -> bool {
    matches!(code, NEXT_VALID_ID | MANAGED_ACCOUNTS)
}
