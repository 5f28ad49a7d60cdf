//! Protocol timing constants and jitter helpers.
//!
//! The intervals here are fixed by RFC 6762; they are gathered in one
//! place so the state machines read against named values rather than
//! magic numbers.

use std::time::Duration;

// Querier (RFC 6762 §5.2/§5.3).

/// Bounds of the random delay before a query's first transmission.
pub(crate) const QUERY_FIRST_DELAY_MIN: Duration = Duration::from_millis(20);
pub(crate) const QUERY_FIRST_DELAY_MAX: Duration = Duration::from_millis(120);

/// Interval between the first and second transmissions; doubles after
/// each send up to [`QUERY_MAX_INTERVAL`].
pub(crate) const QUERY_SECOND_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const QUERY_MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Fractions of a record's TTL at which it is re-queried before expiry,
/// each jittered by up to [`REQUERY_JITTER`] of the TTL.
pub(crate) const REQUERY_FRACTIONS: [f64; 4] = [0.80, 0.85, 0.90, 0.95];
pub(crate) const REQUERY_JITTER: f64 = 0.02;

/// How long a goodbye (TTL 0) record lingers in the cache (RFC 6762
/// §10.1).
pub(crate) const GOODBYE_EXPIRY: Duration = Duration::from_secs(1);

// Responder (RFC 6762 §8).

/// Bound of the random wait before the first probe.
pub(crate) const PROBE_WAIT_MAX: Duration = Duration::from_millis(250);
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_millis(250);
pub(crate) const PROBE_COUNT: u32 = 3;

/// Delay between the first and second announcement.
pub(crate) const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// Bounds of the random delay applied to aggregated (shared-record)
/// responses.
pub(crate) const AGGREGATE_DELAY_MIN: Duration = Duration::from_millis(20);
pub(crate) const AGGREGATE_DELAY_MAX: Duration = Duration::from_millis(120);

/// A record sent within this window is not sent again (RFC 6762 §6).
pub(crate) const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);

/// Outbound TTL for host-volatile records (A, AAAA, SRV, PTR).
pub(crate) const RESPONSE_TTL_HOST: u32 = 120;
/// Outbound TTL for everything else (TXT, NSEC): 75 minutes.
pub(crate) const RESPONSE_TTL_OTHER: u32 = 4500;

// Advertiser (RFC 6763 renaming policy).

/// Sliding window over NameTaken failures, and how many of them inside
/// the window exhaust renaming.
pub(crate) const RENAME_WINDOW: Duration = Duration::from_secs(10);
pub(crate) const MAX_RENAMES_PER_WINDOW: usize = 15;

/// Back-off before reprobing after a lost simultaneous-probe tie-break.
pub(crate) const SIMULTANEOUS_PROBE_BACKOFF: Duration = Duration::from_secs(1);

/// A uniformly random duration in `[min, max]`.
pub(crate) fn rand_delay(min: Duration, max: Duration) -> Duration {
    min + (max - min).mul_f64(rand::random::<f64>())
}
