//! Human-friendly order codes.
//!
//! A code looks like `LOSIA-20260115-QXKEZF7CQQ`: a prefix, the UTC date,
//! and ten characters cut from a ULID and remapped so a customer can read
//! it over the phone. The remap is lossy on purpose; the order store's
//! uniqueness constraint catches the rare collision and the orchestrator
//! regenerates once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::DateTime;
use ulid::Ulid;

use crate::clock::{Clock, EntropySource, SystemClock, ThreadRngEntropy};

/// Prefix used when the caller passes a blank one.
pub const DEFAULT_PREFIX: &str = "LOSIA";

/// Length of the friendly segment.
pub const SEGMENT_LEN: usize = 10;

/// Map a ULID character onto the dictation-safe alphabet.
///
/// `0`/`O` → `Q`, `1`/`I` → `X`, `L` → `Y`. Other characters pass through.
#[must_use]
pub const fn remap_ambiguous(c: char) -> char {
    match c {
        '0' | 'O' => 'Q',
        '1' | 'I' => 'X',
        'L' => 'Y',
        other => other,
    }
}

/// Generates order codes from an injectable clock and entropy source.
///
/// Timestamps handed to the ULID never go backwards and never repeat within
/// one generator, so two codes from the same process differ even inside
/// the same millisecond.
#[derive(Clone)]
pub struct OrderCodeGenerator {
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
    last_millis: Arc<AtomicU64>,
}

impl std::fmt::Debug for OrderCodeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCodeGenerator")
            .field("last_millis", &self.last_millis.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for OrderCodeGenerator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(ThreadRngEntropy))
    }
}

impl OrderCodeGenerator {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, entropy: Arc<dyn EntropySource>) -> Self {
        Self {
            clock,
            entropy,
            last_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Produce the next time-ordered ULID.
    #[must_use]
    pub fn next_ulid(&self) -> Ulid {
        let now = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        let mut prev = self.last_millis.load(Ordering::Relaxed);
        let millis = loop {
            let candidate = now.max(prev.saturating_add(1));
            match self.last_millis.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break candidate,
                Err(actual) => prev = actual,
            }
        };
        Ulid::from_parts(millis, self.entropy.next_u128())
    }

    /// Generate a code of the form `PREFIX-YYYYMMDD-XXXXXXXXXX`.
    ///
    /// The prefix is trimmed and uppercased; a blank prefix becomes
    /// [`DEFAULT_PREFIX`].
    #[must_use]
    pub fn generate(&self, prefix: &str) -> String {
        let prefix = match prefix.trim() {
            "" => DEFAULT_PREFIX.to_owned(),
            p => p.to_uppercase(),
        };

        let ulid = self.next_ulid();
        let date = i64::try_from(ulid.timestamp_ms())
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(|| self.clock.now())
            .format("%Y%m%d");

        let segment: String = ulid
            .to_string()
            .chars()
            .take(SEGMENT_LEN)
            .map(|c| remap_ambiguous(c.to_ascii_uppercase()))
            .collect();

        format!("{prefix}-{date}-{segment}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use regex::Regex;

    use super::*;
    use crate::clock::{FixedClock, FixedEntropy};

    fn fixed_generator() -> OrderCodeGenerator {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap());
        OrderCodeGenerator::new(Arc::new(clock), Arc::new(FixedEntropy(0xDEAD_BEEF)))
    }

    #[test]
    fn test_known_answer() {
        let generator = fixed_generator();
        // 1768435200000 ms -> ULID time segment "01KEZF7C00"
        assert_eq!(generator.generate("LOSIA"), "LOSIA-20260115-QXKEZF7CQQ");
        // same millisecond: timestamp bumped by one, last char 1 -> X
        assert_eq!(generator.generate("LOSIA"), "LOSIA-20260115-QXKEZF7CQX");
    }

    #[test]
    fn test_shape_and_alphabet() {
        let pattern = Regex::new(r"^LOSIA-\d{8}-[A-Z2-9]{10}$").unwrap();
        let generator = OrderCodeGenerator::default();
        for _ in 0..500 {
            let code = generator.generate("LOSIA");
            assert!(pattern.is_match(&code), "bad code {code}");
            let segment = code.rsplit('-').next().unwrap();
            assert!(
                !segment.contains(['0', '1', 'I', 'L', 'O']),
                "ambiguous char in {code}"
            );
        }
    }

    #[test]
    fn test_codes_from_one_generator_are_distinct() {
        let generator = fixed_generator();
        // 20 consecutive milliseconds stay clear of the natural Q/X/Y digits
        let codes: std::collections::HashSet<_> =
            (0..20).map(|_| generator.generate("LOSIA")).collect();
        assert_eq!(codes.len(), 20);
    }

    #[test]
    fn test_prefix_normalization() {
        let generator = fixed_generator();
        assert!(generator.generate("  shop ").starts_with("SHOP-20260115-"));
        assert!(generator.generate("").starts_with("LOSIA-20260115-"));
    }

    #[test]
    fn test_remap_table() {
        assert_eq!(remap_ambiguous('0'), 'Q');
        assert_eq!(remap_ambiguous('O'), 'Q');
        assert_eq!(remap_ambiguous('1'), 'X');
        assert_eq!(remap_ambiguous('I'), 'X');
        assert_eq!(remap_ambiguous('L'), 'Y');
        assert_eq!(remap_ambiguous('K'), 'K');
    }
}
