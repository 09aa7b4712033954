use crate::error::{GwError, GwResult, ProtocolError};
use crate::wire::codes;

/// A decoded frame, exposed to callers as a cursor over its NUL-delimited
/// fields.
///
/// `Message` never validates field *content* — that is the codec's job —
/// but it does own the one piece of framing every caller needs: splitting
/// the payload into fields and tracking which one comes next.
#[derive(Debug)]
pub struct Message {
    fields: Vec<String>,
    pos: usize,
    parse_failed: bool,
}

/// What the core learned about a frame by partially consuming it.
///
/// Everything after `code` and (if present) `req_id` is left unread on the
/// returned `Message`, positioned for the caller to continue with
/// `read_string`/`read_int`/etc.
pub(crate) struct Opened {
    pub(crate) code: i32,
    pub(crate) req_id: RoutingId,
    pub(crate) message: Message,
}

/// Where a decoded frame should be routed.
///
/// Distinguishes the `"IGNORE"` sentinel, which the receiver drops without a
/// trace, from a code that simply carries no per-request ID at all (the two
/// handshake pushes), which the receiver still surfaces on the system
/// channel — conflating them would silently swallow legitimate connection-
/// wide traffic.
pub(crate) enum RoutingId {
    /// A live request ID, stringified on the wire.
    Request(i64),
    /// No request ID on the wire for this code; route to the system channel.
    System,
    /// The `"IGNORE"` sentinel; drop without routing anywhere.
    Ignore,
}

impl Message {
    fn from_fields(fields: Vec<String>) -> Self {
        Self {
            fields,
            pos: 0,
            parse_failed: false,
        }
    }

    /// Splits a raw frame payload into NUL-terminated fields.
    ///
    /// A trailing empty field produced by the frame's final NUL is dropped;
    /// this mirrors the wire's own convention of terminating (not
    /// separating) fields.
    pub(crate) fn parse(payload: &[u8]) -> GwResult<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| {
            GwError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            ))
        })?;
        let mut fields: Vec<String> = text.split('\0').map(str::to_owned).collect();
        if fields.last().map(String::is_empty).unwrap_or(false) {
            fields.pop();
        }
        Ok(Self::from_fields(fields))
    }

    /// Parses a frame far enough to route it: extracts the leading code,
    /// skips a version field if that code carries one, then reads the
    /// request ID field (or recognizes the `"IGNORE"` sentinel).
    ///
    /// The returned `Message`'s cursor sits right after the ID, ready for
    /// the caller to read the body with the other `read_*` methods.
    pub(crate) fn open(payload: &[u8]) -> GwResult<Opened> {
        let mut msg = Self::parse(payload)?;
        let code: i32 = msg.read_int()?;

        if codes::has_leading_version(code) {
            let _version: i64 = msg.read_int()?;
        }

        if code == codes::ERR_MSG {
            let _version: i64 = msg.read_int()?;
            let req_id = msg.read_int()?;
            let err_code: i32 = msg.read_int()?;
            let err_text = msg.read_string()?;
            let req_id = if req_id == -1 { None } else { Some(req_id) };
            return Err(GwError::Protocol(ProtocolError {
                code: err_code,
                message: err_text,
                req_id,
            }));
        }

        if codes::is_system_only(code) {
            return Ok(Opened {
                code,
                req_id: RoutingId::System,
                message: msg,
            });
        }

        let id_field = msg.read_string()?;
        if id_field == codes::IGNORE {
            return Ok(Opened {
                code,
                req_id: RoutingId::Ignore,
                message: msg,
            });
        }
        let req_id: i64 = id_field
            .parse()
            .map_err(|_| GwError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("non-numeric request id field {id_field:?} for code {code}"),
            )))?;

        Ok(Opened {
            code,
            req_id: RoutingId::Request(req_id),
            message: msg,
        })
    }

    /// Reads the next field, tolerating trailing fields a newer server
    /// version might have dropped: running past the end of the payload
    /// sets [`Message::parse_failed`] and yields an empty field rather
    /// than erroring, so a codec reading an older frame still gets
    /// zero-valued results for fields it expected but the server omitted.
    fn next_field(&mut self) -> &str {
        match self.fields.get(self.pos) {
            Some(field) => {
                self.pos += 1;
                field.as_str()
            }
            None => {
                self.parse_failed = true;
                ""
            }
        }
    }

    /// Reads the next field as a (possibly empty) string.
    pub fn read_string(&mut self) -> GwResult<String> {
        Ok(self.next_field().to_owned())
    }

    /// Reads the next field as an integer; an empty field (including one
    /// synthesized by reading past the end of the payload) reads as `0`.
    pub fn read_int(&mut self) -> GwResult<i64> {
        let field = self.next_field();
        if field.is_empty() {
            return Ok(0);
        }
        field.parse().map_err(|_| {
            GwError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected an integer field, got {field:?}"),
            ))
        })
    }

    /// Reads the next field as an integer, or `None` if the gateway sent
    /// its "unset" sentinel — either an empty field, or the `i32::MAX`/
    /// `i64::MAX` magic values the wire protocol uses in place of a real
    /// "no value" marker.
    pub fn read_int_unset(&mut self) -> GwResult<Option<i64>> {
        let field = self.next_field();
        if field.is_empty() {
            return Ok(None);
        }
        let value: i64 = field.parse().map_err(|_| {
            GwError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected an integer field, got {field:?}"),
            ))
        })?;
        if value == i64::from(i32::MAX) || value == i64::MAX {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    /// Reads the next field as a float; an empty field reads as `0.0`.
    pub fn read_float(&mut self) -> GwResult<f64> {
        let field = self.next_field();
        if field.is_empty() {
            return Ok(0.0);
        }
        field.parse().map_err(|_| {
            GwError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected a float field, got {field:?}"),
            ))
        })
    }

    /// Reads the next field as a boolean, where `"0"` (including an empty
    /// field, which reads as `0` the same way [`Message::read_int`] treats
    /// it) is false and anything else is true — matching the gateway's own
    /// loose convention rather than Rust's `bool::from_str`.
    pub fn read_bool(&mut self) -> GwResult<bool> {
        let field = self.next_field();
        Ok(field != "0" && !field.is_empty())
    }

    /// Reads the next field as `;`-separated `start-end` session ranges.
    ///
    /// Each endpoint is parsed with `parse_endpoint` against the supplied
    /// time zone; an entry that has no `-` and ends in `CLOSED` yields a
    /// closed (`None`) session rather than an error, and an endpoint that
    /// fails to parse yields `None` for that side — this tolerance mirrors
    /// the gateway's own parser, which never fails a whole frame over one
    /// malformed session string.
    pub fn read_sessions<F>(&mut self, mut parse_endpoint: F) -> GwResult<Vec<Session>>
    where
        F: FnMut(&str) -> Option<chrono::NaiveDateTime>,
    {
        let field = self.next_field().to_owned();
        Ok(field
            .split(';')
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let parts: Vec<&str> = entry.split('-').collect();
                match parts.as_slice() {
                    [only] if only.ends_with("CLOSED") => Session { start: None, end: None },
                    [start, end] => Session {
                        start: parse_endpoint(start),
                        end: parse_endpoint(end),
                    },
                    _ => Session { start: None, end: None },
                }
            })
            .collect())
    }

    /// Whether every field has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.fields.len()
    }

    /// Whether a read has ever run past the end of this frame's fields.
    ///
    /// The core never acts on this itself — whether running out of fields
    /// mid-decode is worth surfacing as an error is a codec's call, since
    /// it depends on which fields that codec actually needed.
    pub fn parse_failed(&self) -> bool {
        self.parse_failed
    }
}

/// One trading-session window, as decoded by [`Message::read_sessions`].
///
/// A `None` endpoint means the session was reported closed, or its
/// timestamp failed to parse — the gateway itself does not distinguish
/// the two cases, so neither does this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub start: Option<chrono::NaiveDateTime>,
    pub end: Option<chrono::NaiveDateTime>,
}
