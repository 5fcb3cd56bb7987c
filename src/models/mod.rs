use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Seconds per stored candle; everything durable is 1-minute bars
pub const BASE_INTERVAL_SECS: i64 = 60;

/// A fixed-interval OHLC price bar
///
/// `timestamp` is epoch seconds floored to the interval boundary, so for a
/// given (symbol, timestamp) at most one candle exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Floor an epoch timestamp to the start of its bucket
    ///
    /// A non-positive interval has no buckets; the timestamp comes back
    /// unchanged rather than dividing by zero.
    pub fn floor_timestamp(ts: i64, interval_secs: i64) -> i64 {
        if interval_secs <= 0 {
            return ts;
        }
        ts - ts.rem_euclid(interval_secs)
    }

    /// Return a copy with the timestamp floored to the 1-minute boundary
    pub fn aligned(mut self) -> Self {
        self.timestamp = Self::floor_timestamp(self.timestamp, BASE_INTERVAL_SECS);
        self
    }
}

/// A tradable instrument identified by a broker-specific numeric token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub token: u32,
}

/// The default index instruments this backend trades
pub fn default_instruments() -> Vec<Instrument> {
    vec![
        Instrument {
            symbol: "NIFTY".to_string(),
            token: 256_265,
        },
        Instrument {
            symbol: "BANKNIFTY".to_string(),
            token: 260_105,
        },
        Instrument {
            symbol: "SENSEX".to_string(),
            token: 265,
        },
    ]
}

/// Execution mode for the algo session
///
/// Closed enumeration - unrecognized mode strings are rejected at the
/// boundary instead of being stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlgoMode {
    Demo,
    Live,
}

impl Default for AlgoMode {
    fn default() -> Self {
        AlgoMode::Demo
    }
}

impl fmt::Display for AlgoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgoMode::Demo => write!(f, "DEMO"),
            AlgoMode::Live => write!(f, "LIVE"),
        }
    }
}

/// A mode string that matched neither DEMO nor LIVE
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown algo mode: {0}")]
pub struct ParseAlgoModeError(String);

impl FromStr for AlgoMode {
    type Err = ParseAlgoModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEMO" => Ok(AlgoMode::Demo),
            "LIVE" => Ok(AlgoMode::Live),
            other => Err(ParseAlgoModeError(other.to_string())),
        }
    }
}
