//! Sources of ids, digests, sizes and timestamps.
//!
//! Handlers never reach for global randomness or the wall clock directly;
//! they ask an [`IdSource`]. [`RandomIds`] is what a real session uses and
//! [`SequentialIds`] gives reproducible output for tests and demos.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

pub trait IdSource {
    /// `len` lowercase hex digits.
    fn hex(&mut self, len: usize) -> String;

    fn uuid(&mut self) -> String;

    /// A number in `0..bound` (0 when `bound` is 0).
    fn below(&mut self, bound: u64) -> u64;

    fn now(&mut self) -> DateTime<Utc>;

    /// Short container id.
    fn container_id(&mut self) -> String {
        self.hex(12)
    }

    /// `sha256:` content digest.
    fn digest(&mut self) -> String {
        format!("sha256:{}", self.hex(64))
    }

    fn size_between(&mut self, min: u64, max: u64) -> u64 {
        min + self.below(max.saturating_sub(min))
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        let idx = self.below(items.len() as u64) as usize;
        items.get(idx).copied().unwrap_or_default()
    }
}

/// Random ids and the real clock.
pub struct RandomIds {
    rng: StdRng,
}

impl Default for RandomIds {
    fn default() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl IdSource for RandomIds {
    fn hex(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| char::from_digit(self.rng.gen_range(0..16), 16).unwrap_or('0'))
            .collect()
    }

    fn uuid(&mut self) -> String {
        Uuid::new_v4().to_string()
    }

    fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.rng.gen_range(0..bound)
    }

    fn now(&mut self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Counter-based ids and a clock that ticks one second per reading.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    counter: u64,
    epoch: DateTime<Utc>,
    ticks: i64,
}

/// 2024-01-01T00:00:00Z
const EPOCH_SECS: i64 = 1_704_067_200;

impl Default for SequentialIds {
    fn default() -> Self {
        Self {
            counter: 0,
            epoch: DateTime::from_timestamp(EPOCH_SECS, 0).unwrap_or_default(),
            ticks: 0,
        }
    }
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

impl IdSource for SequentialIds {
    fn hex(&mut self, len: usize) -> String {
        let n = self.next();
        let digits = format!("{n:0len$x}");
        digits[digits.len() - len..].to_string()
    }

    fn uuid(&mut self) -> String {
        Uuid::from_u128(u128::from(self.next())).to_string()
    }

    fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.next() % bound
    }

    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        self.epoch + Duration::seconds(self.ticks)
    }
}
