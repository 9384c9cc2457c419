//! Bar interval definitions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported bar interval.
///
/// Every interval except [`Interval::Day1`] is derived from the 1-second base
/// series by aggregation. Daily bars are fetched directly from upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    /// 1-second bars (the base series).
    #[serde(rename = "1s")]
    Second1,
    /// 5-second bars.
    #[serde(rename = "5s")]
    Second5,
    /// 10-second bars.
    #[serde(rename = "10s")]
    Second10,
    /// 15-second bars.
    #[serde(rename = "15s")]
    Second15,
    /// 30-second bars.
    #[serde(rename = "30s")]
    Second30,
    /// 45-second bars.
    #[serde(rename = "45s")]
    Second45,
    /// 1-minute bars.
    #[serde(rename = "1m")]
    Minute1,
    /// 5-minute bars.
    #[serde(rename = "5m")]
    Minute5,
    /// 10-minute bars.
    #[serde(rename = "10m")]
    Minute10,
    /// 15-minute bars.
    #[serde(rename = "15m")]
    Minute15,
    /// 30-minute bars.
    #[serde(rename = "30m")]
    Minute30,
    /// 45-minute bars.
    #[serde(rename = "45m")]
    Minute45,
    /// 1-hour bars.
    #[serde(rename = "1h")]
    Hour1,
    /// Daily bars.
    #[serde(rename = "1d")]
    Day1,
}

impl Interval {
    /// Returns the bucket width in seconds.
    #[must_use]
    pub const fn seconds(&self) -> u32 {
        match self {
            Self::Second1 => 1,
            Self::Second5 => 5,
            Self::Second10 => 10,
            Self::Second15 => 15,
            Self::Second30 => 30,
            Self::Second45 => 45,
            Self::Minute1 => 60,
            Self::Minute5 => 300,
            Self::Minute10 => 600,
            Self::Minute15 => 900,
            Self::Minute30 => 1800,
            Self::Minute45 => 2700,
            Self::Hour1 => 3600,
            Self::Day1 => 86_400,
        }
    }

    /// Returns true for the 1-second base interval.
    #[must_use]
    pub const fn is_base(&self) -> bool {
        matches!(self, Self::Second1)
    }

    /// Returns true for daily bars, which are never aggregated on request.
    #[must_use]
    pub const fn is_daily(&self) -> bool {
        matches!(self, Self::Day1)
    }

    /// Returns the canonical label (e.g. `"5m"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Second1 => "1s",
            Self::Second5 => "5s",
            Self::Second10 => "10s",
            Self::Second15 => "15s",
            Self::Second30 => "30s",
            Self::Second45 => "45s",
            Self::Minute1 => "1m",
            Self::Minute5 => "5m",
            Self::Minute10 => "10m",
            Self::Minute15 => "15m",
            Self::Minute30 => "30m",
            Self::Minute45 => "45m",
            Self::Hour1 => "1h",
            Self::Day1 => "1d",
        }
    }

    /// Returns all supported intervals, ordered by width.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Second1,
            Self::Second5,
            Self::Second10,
            Self::Second15,
            Self::Second30,
            Self::Second45,
            Self::Minute1,
            Self::Minute5,
            Self::Minute10,
            Self::Minute15,
            Self::Minute30,
            Self::Minute45,
            Self::Hour1,
            Self::Day1,
        ]
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1s" | "s1" => Ok(Self::Second1),
            "5s" | "s5" => Ok(Self::Second5),
            "10s" | "s10" => Ok(Self::Second10),
            "15s" | "s15" => Ok(Self::Second15),
            "30s" | "s30" => Ok(Self::Second30),
            "45s" | "s45" => Ok(Self::Second45),
            "1m" | "m1" => Ok(Self::Minute1),
            "5m" | "m5" => Ok(Self::Minute5),
            "10m" | "m10" => Ok(Self::Minute10),
            "15m" | "m15" => Ok(Self::Minute15),
            "30m" | "m30" => Ok(Self::Minute30),
            "45m" | "m45" => Ok(Self::Minute45),
            "1h" | "h1" | "60m" => Ok(Self::Hour1),
            "1d" | "d1" | "daily" => Ok(Self::Day1),
            _ => Err(IntervalParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unsupported interval string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "unsupported interval '{0}', expected one of: 1s, 5s, 10s, 15s, 30s, 45s, 1m, 5m, 10m, 15m, 30m, 45m, 1h, 1d"
)]
pub struct IntervalParseError(String);
