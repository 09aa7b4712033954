use std::time::Duration;

/// Tunable constants for a [`Connection`](crate::Connection) and for
/// [`keep_alive`](crate::supervisor::keep_alive).
///
/// All values have defaults matching the gateway's documented behavior;
/// most callers never need to touch this.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    reconnect_interval: Duration,
    requests_per_second: u32,
    min_order_id: i64,
    min_ticker_id: i64,
    first_reply_timeout: Duration,
    handshake_timeout: Duration,
    client_version_range: (i64, i64),
    readonly: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Self::DEFAULT_RECONNECT_INTERVAL,
            requests_per_second: Self::DEFAULT_REQUESTS_PER_SECOND,
            min_order_id: Self::DEFAULT_MIN_ORDER_ID,
            min_ticker_id: Self::DEFAULT_MIN_TICKER_ID,
            first_reply_timeout: Self::DEFAULT_FIRST_REPLY_TIMEOUT,
            handshake_timeout: Self::DEFAULT_HANDSHAKE_TIMEOUT,
            client_version_range: Self::DEFAULT_CLIENT_VERSION_RANGE,
            readonly: false,
        }
    }
}

impl GatewayConfig {
    /// Default delay between reconnect attempts in [`keep_alive`](crate::supervisor::keep_alive).
    pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

    /// Default global cap on requests written to the wire per second.
    pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 50;

    /// Default floor for the order-ID allocator (`2^10`).
    pub const DEFAULT_MIN_ORDER_ID: i64 = 1 << 10;

    /// Default floor for the ticker-ID allocator (`2^4`).
    pub const DEFAULT_MIN_TICKER_ID: i64 = 1 << 4;

    /// Default deadline for a single-reply request's first (and only) message.
    pub const DEFAULT_FIRST_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default soft deadline for the whole handshake sequence.
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Default `(min, max)` client protocol version advertised in the banner.
    pub const DEFAULT_CLIENT_VERSION_RANGE: (i64, i64) = (100, 151);

    /// Returns the reconnect interval.
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }
    /// Builder-method for the reconnect interval.
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Returns the global requests-per-second cap.
    #[must_use]
    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }
    /// Builder-method for the global requests-per-second cap.
    #[must_use]
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Returns the order-ID floor.
    #[must_use]
    pub fn min_order_id(&self) -> i64 {
        self.min_order_id
    }
    /// Builder-method for the order-ID floor.
    #[must_use]
    pub fn with_min_order_id(mut self, min_order_id: i64) -> Self {
        self.min_order_id = min_order_id;
        self
    }

    /// Returns the ticker-ID floor.
    #[must_use]
    pub fn min_ticker_id(&self) -> i64 {
        self.min_ticker_id
    }
    /// Builder-method for the ticker-ID floor.
    #[must_use]
    pub fn with_min_ticker_id(mut self, min_ticker_id: i64) -> Self {
        self.min_ticker_id = min_ticker_id;
        self
    }

    /// Returns the first-reply timeout.
    #[must_use]
    pub fn first_reply_timeout(&self) -> Duration {
        self.first_reply_timeout
    }
    /// Builder-method for the first-reply timeout.
    #[must_use]
    pub fn with_first_reply_timeout(mut self, timeout: Duration) -> Self {
        self.first_reply_timeout = timeout;
        self
    }

    /// Returns the handshake deadline.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
    /// Builder-method for the handshake deadline.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the advertised `(min, max)` client version range.
    #[must_use]
    pub fn client_version_range(&self) -> (i64, i64) {
        self.client_version_range
    }
    /// Builder-method for the advertised client version range.
    #[must_use]
    pub fn with_client_version_range(mut self, range: (i64, i64)) -> Self {
        self.client_version_range = range;
        self
    }

    /// Returns whether order (ORDER-kind) requests are disabled.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }
    /// Builder-method for disabling order submission.
    #[must_use]
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }
}
