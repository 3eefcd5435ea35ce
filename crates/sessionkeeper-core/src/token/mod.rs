//! Token pair and offline token inspection.

pub mod codec;
pub mod pair;

pub use codec::{DecodedTokenPayload, TokenCodec, TokenKind};
pub use pair::TokenPair;

use chrono::Duration;

/// Configured lifetimes are capped at 100 years so date arithmetic cannot overflow.
const MAX_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

pub(crate) fn clamped_seconds(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_SECONDS) as i64)
}
