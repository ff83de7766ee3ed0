//! Unit newtypes for the quantities that cross the configuration boundary.
//!
//! Tree configurations mix degrees (angle increments, critical angle shift),
//! milliseconds (time steps, time shifts) and power strings such as `"50MW"`.
//! The algorithms work in radians, seconds and per-unit. These wrappers keep
//! the conversions explicit.
//!
//! ```
//! use eeac_core::units::{Degrees, Milliseconds, PowerQuantity};
//!
//! let shift = Degrees(4.0).to_radians();
//! assert!((shift.value() - 4.0_f64.to_radians()).abs() < 1e-12);
//!
//! let step = Milliseconds(170.0).to_seconds();
//! assert!((step.value() - 0.17).abs() < 1e-12);
//!
//! let power: PowerQuantity = "250 kW".parse().unwrap();
//! assert!((power.to_per_unit(100.0) - 0.0025).abs() < 1e-12);
//! ```

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use crate::error::EeacError;

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }
    };
}

/// Angle in radians
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Radians(pub f64);

impl_unit_ops!(Radians, "rad");

impl Radians {
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }
}

/// Angle in degrees, as written in tree configurations
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Degrees(pub f64);

impl_unit_ops!(Degrees, "°");

impl Degrees {
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

/// Duration in milliseconds, as written in tree configurations
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Milliseconds(pub f64);

impl_unit_ops!(Milliseconds, "ms");

impl Milliseconds {
    #[inline]
    pub fn to_seconds(self) -> Seconds {
        Seconds(self.0 / 1000.0)
    }
}

/// Duration in seconds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Seconds(pub f64);

impl_unit_ops!(Seconds, "s");

impl Seconds {
    #[inline]
    pub fn to_millis(self) -> Milliseconds {
        Milliseconds(self.0 * 1000.0)
    }
}

/// Active power in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

impl Megawatts {
    /// Per-unit value on a system base expressed in MVA.
    #[inline]
    pub fn to_per_unit(self, base_mva: f64) -> f64 {
        self.0 / base_mva
    }
}

/// Power units accepted in `min_cluster_power`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerUnit {
    #[serde(rename = "MW")]
    Megawatt,
    #[serde(rename = "kW")]
    Kilowatt,
    #[serde(rename = "W")]
    Watt,
}

impl PowerUnit {
    fn factor_to_mw(self) -> f64 {
        match self {
            PowerUnit::Megawatt => 1.0,
            PowerUnit::Kilowatt => 1e-3,
            PowerUnit::Watt => 1e-6,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            PowerUnit::Megawatt => "MW",
            PowerUnit::Kilowatt => "kW",
            PowerUnit::Watt => "W",
        }
    }
}

static POWER_PATTERN: Lazy<Result<Regex, regex_lite::Error>> =
    Lazy::new(|| Regex::new(r"^(\d*\.?\d+)\s*(MW|kW|W)$"));

/// A power quantity written as `<number><unit>`, e.g. `"12.5MW"` or `"300 kW"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerQuantity {
    pub value: f64,
    pub unit: PowerUnit,
}

impl PowerQuantity {
    pub fn to_megawatts(self) -> Megawatts {
        Megawatts(self.value * self.unit.factor_to_mw())
    }

    pub fn to_per_unit(self, base_mva: f64) -> f64 {
        self.to_megawatts().to_per_unit(base_mva)
    }
}

impl FromStr for PowerQuantity {
    type Err = EeacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pattern = POWER_PATTERN
            .as_ref()
            .map_err(|e| EeacError::Other(format!("power pattern: {e}")))?;
        let caps = pattern
            .captures(s.trim())
            .ok_or_else(|| EeacError::Config(format!("invalid power value '{s}', expected e.g. '50MW'")))?;
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| EeacError::Config(format!("invalid power value '{s}'")))?;
        let unit = match &caps[2] {
            "MW" => PowerUnit::Megawatt,
            "kW" => PowerUnit::Kilowatt,
            _ => PowerUnit::Watt,
        };
        Ok(Self { value, unit })
    }
}

impl fmt::Display for PowerQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.symbol())
    }
}

impl Serialize for PowerQuantity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PowerQuantity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_conversions() {
        let rad = Degrees(180.0).to_radians();
        assert!((rad.value() - std::f64::consts::PI).abs() < 1e-12);
        assert!((rad.to_degrees().value() - 180.0).abs() < 1e-10);
        assert_eq!(-Degrees(4.0), Degrees(-4.0));
    }

    #[test]
    fn test_time_conversions() {
        assert!((Milliseconds(162.37).to_seconds().value() - 0.16237).abs() < 1e-12);
        assert!((Seconds(0.5).to_millis().value() - 500.0).abs() < 1e-12);
    }

    #[test]
    fn test_power_parsing() {
        let p: PowerQuantity = "50MW".parse().unwrap();
        assert_eq!(p.unit, PowerUnit::Megawatt);
        assert!((p.to_per_unit(100.0) - 0.5).abs() < 1e-12);

        let p: PowerQuantity = ".5 W".parse().unwrap();
        assert!((p.to_megawatts().value() - 0.5e-6).abs() < 1e-18);

        let p: PowerQuantity = "1500kW".parse().unwrap();
        assert!((p.to_megawatts().value() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_power_rejects_unknown_units() {
        assert!("50 GW".parse::<PowerQuantity>().is_err());
        assert!("MW".parse::<PowerQuantity>().is_err());
        assert!("-5MW".parse::<PowerQuantity>().is_err());
    }

    #[test]
    fn test_power_serde_is_a_string() {
        let p: PowerQuantity = serde_json::from_str("\"12.5MW\"").unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"12.5MW\"");
        assert!(serde_json::from_str::<PowerQuantity>("\"12.5 Mvar\"").is_err());
    }
}
