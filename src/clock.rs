//! Time source abstraction.
//!
//! Every timestamp the application writes goes through a [`Clock`] and is
//! truncated to whole microseconds, which is also the precision it is stored
//! with. A value read back from any backend therefore compares equal to the
//! value that was written.

use std::fmt::Debug;

use time::OffsetDateTime;

#[cfg(test)]
use std::sync::Mutex;
#[cfg(test)]
use time::Duration;

pub trait Clock: Send + Sync + Debug {
    /// Current UTC time, truncated to microseconds.
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        truncate_to_micros(OffsetDateTime::now_utc())
    }
}

pub fn truncate_to_micros(t: OffsetDateTime) -> OffsetDateTime {
    let nanos = t.nanosecond() / 1_000 * 1_000;
    t.replace_nanosecond(nanos).unwrap_or(t)
}

fn to_micros(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000) as i64
}

fn from_micros(micros: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
}

/// Serde adapter storing an [`OffsetDateTime`] as integer microseconds since
/// the Unix epoch, so stored timestamps sort numerically.
pub mod micros {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(t: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(super::to_micros(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        super::from_micros(i64::deserialize(d)?).map_err(D::Error::custom)
    }

    pub mod option {
        use serde::{de::Error, Deserialize, Deserializer, Serializer};
        use time::OffsetDateTime;

        pub fn serialize<S: Serializer>(t: &Option<OffsetDateTime>, s: S) -> Result<S::Ok, S::Error> {
            match t {
                Some(t) => s.serialize_some(&super::super::to_micros(*t)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<OffsetDateTime>, D::Error> {
            Option::<i64>::deserialize(d)?
                .map(super::super::from_micros)
                .transpose()
                .map_err(D::Error::custom)
        }
    }
}

/// Test clock that advances one second on every read, so consecutive writes
/// get strictly increasing timestamps.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(truncate_to_micros(start)),
        }
    }

    /// Moves the clock forward without reading it.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    /// Current value without advancing.
    pub fn peek(&self) -> OffsetDateTime {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        let mut now = self.now.lock().unwrap();
        let current = *now;
        *now += Duration::seconds(1);
        current
    }
}
