//! TCP connection model
//!
//! A [`TcpConnection`] is the pooled, per-origin resource; a [`Transfer`] is
//! one request's progress over it: handshake and request latency first, then
//! the body in RTT-sized rounds whose size is capped by the congestion window
//! (slow start) and by the request's fair share of the link.

/// Maximum segment size (bytes)
pub const TCP_SEGMENT_SIZE: f64 = 1460.0;

/// Initial congestion window (segments)
pub const INITIAL_CONGESTION_WINDOW: f64 = 10.0;

/// Handles whole-round boundaries reached through floating point arithmetic
const ROUND_EPSILON_MS: f64 = 1e-9;

/// Identifier of a pooled connection, unique within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u32);

/// A simulated connection to one origin
#[derive(Debug, Clone, PartialEq)]
pub struct TcpConnection {
    id: ConnectionId,
    origin: String,
    multiplexed: bool,
    warm: bool,
    congestion_window: f64,
    in_flight: usize,
}

impl TcpConnection {
    pub(crate) fn new(id: ConnectionId, origin: impl Into<String>, multiplexed: bool) -> Self {
        Self {
            id,
            origin: origin.into(),
            multiplexed,
            warm: false,
            congestion_window: INITIAL_CONGESTION_WINDOW,
            in_flight: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether this is an H2/H3 connection
    #[inline]
    #[must_use]
    pub fn is_multiplexed(&self) -> bool {
        self.multiplexed
    }

    /// Whether at least one request has completed on it since it was opened
    #[inline]
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.warm
    }

    #[inline]
    #[must_use]
    pub fn congestion_window(&self) -> f64 {
        self.congestion_window
    }

    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    pub(crate) fn lease(&mut self) {
        self.in_flight += 1;
    }

    /// Drop all state and start over as a fresh, cold connection
    pub(crate) fn reset(&mut self) {
        assert!(self.is_idle(), "reset of connection {:?} with requests in flight", self.id);
        self.warm = false;
        self.congestion_window = INITIAL_CONGESTION_WINDOW;
    }

    /// A request finished; the connection is warm and keeps its grown window
    pub(crate) fn release(&mut self, congestion_window: f64) {
        assert!(self.in_flight > 0, "release of idle connection {:?}", self.id);
        self.in_flight -= 1;
        self.warm = true;
        self.congestion_window = self.congestion_window.max(congestion_window);
    }
}

/// Progress of one request on its connection
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    setup_remaining_ms: f64,
    bytes_remaining: f64,
    congestion_window: f64,
    max_congestion_window: f64,
    round_elapsed_ms: f64,
    rtt_ms: f64,
}

impl Transfer {
    /// A transfer of `bytes` that first waits `setup_ms` for the first byte
    ///
    /// `link_bytes_per_ms` bounds how far slow start can grow the window.
    #[must_use]
    pub fn new(
        setup_ms: f64,
        bytes: u64,
        rtt_ms: f64,
        congestion_window: f64,
        link_bytes_per_ms: f64,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let bytes_remaining = bytes as f64;
        let max_congestion_window = (link_bytes_per_ms * rtt_ms / TCP_SEGMENT_SIZE).max(1.0);
        Self {
            setup_remaining_ms: setup_ms.max(0.0),
            bytes_remaining,
            congestion_window,
            max_congestion_window,
            round_elapsed_ms: 0.0,
            rtt_ms,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.setup_remaining_ms <= 0.0 && self.bytes_remaining <= 0.0
    }

    #[inline]
    #[must_use]
    pub fn congestion_window(&self) -> f64 {
        self.congestion_window
    }

    #[inline]
    #[must_use]
    pub fn bytes_remaining(&self) -> f64 {
        self.bytes_remaining
    }

    /// Time to finish if the share stayed at `share_bytes_per_ms` throughout
    #[must_use]
    pub fn time_to_completion(&self, share_bytes_per_ms: f64) -> f64 {
        self.clone().advance(f64::INFINITY, share_bytes_per_ms)
    }

    /// Make progress for at most `budget_ms`; returns the time actually used
    ///
    /// Less than `budget_ms` is used only when the transfer completes.
    pub fn advance(&mut self, budget_ms: f64, share_bytes_per_ms: f64) -> f64 {
        let mut elapsed = 0.0;

        if self.setup_remaining_ms > 0.0 {
            let step = self.setup_remaining_ms.min(budget_ms);
            self.setup_remaining_ms -= step;
            elapsed += step;
            if self.setup_remaining_ms > 0.0 {
                return elapsed;
            }
        }

        while self.bytes_remaining > 0.0 && elapsed < budget_ms {
            let available = budget_ms - elapsed;

            if self.rtt_ms <= 0.0 {
                // No round trips, no slow start: the share is the only cap
                if share_bytes_per_ms.is_infinite() {
                    self.bytes_remaining = 0.0;
                    break;
                }
                let needed = self.bytes_remaining / share_bytes_per_ms;
                if needed <= available {
                    self.bytes_remaining = 0.0;
                    elapsed += needed;
                } else {
                    self.bytes_remaining -= available * share_bytes_per_ms;
                    elapsed = budget_ms;
                }
                break;
            }

            let window_rate = self.congestion_window * TCP_SEGMENT_SIZE / self.rtt_ms;
            if window_rate >= share_bytes_per_ms {
                // Window no longer limits the rate: the rest is linear
                let needed = self.bytes_remaining / share_bytes_per_ms;
                let step = needed.min(available);
                if needed <= available {
                    self.bytes_remaining = 0.0;
                } else {
                    self.bytes_remaining -= step * share_bytes_per_ms;
                }
                self.elapse_rounds(step);
                elapsed += step;
                break;
            }

            let round_left = self.rtt_ms - self.round_elapsed_ms;
            let needed = self.bytes_remaining / window_rate;

            if needed <= round_left && needed <= available {
                self.bytes_remaining = 0.0;
                self.round_elapsed_ms += needed;
                elapsed += needed;
                break;
            }

            let step = round_left.min(available);
            self.bytes_remaining -= step * window_rate;
            elapsed += step;
            if step >= round_left - ROUND_EPSILON_MS {
                self.elapse_rounds(round_left);
            } else {
                self.round_elapsed_ms += step;
            }
        }

        elapsed
    }

    /// Account for `ms` of transfer time, doubling the window per full round
    fn elapse_rounds(&mut self, ms: f64) {
        let total = self.round_elapsed_ms + ms;
        let rounds = ((total + ROUND_EPSILON_MS) / self.rtt_ms).floor();
        self.round_elapsed_ms = (total - rounds * self.rtt_ms).max(0.0);
        if rounds >= 1.0 {
            #[allow(clippy::cast_possible_truncation)]
            let factor = 2f64.powi(rounds.min(64.0) as i32);
            self.congestion_window = (self.congestion_window * factor)
                .min(self.max_congestion_window)
                .max(self.congestion_window);
        }
    }
}
