//! Human readable size values ("10k", "1.5M", "2G")

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// Size in bytes, parsed from an integer or a string with a binary suffix
///
/// `k`, `M` and `G` multiply by 1024, 1024² and 1024³. The significand may be
/// decimal (`1.5M`). Suffixes are case sensitive: `10m` is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let invalid = || ContractError::config_parse(format!("'{value}' is an unknown size value"));

        let (number, power) = match value.char_indices().last() {
            Some((idx, 'k')) => (&value[..idx], 1),
            Some((idx, 'M')) => (&value[..idx], 2),
            Some((idx, 'G')) => (&value[..idx], 3),
            Some(_) => (value, 0),
            None => return Err(invalid()),
        };

        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(invalid());
        }

        let significand: f64 = number.parse().map_err(|_| invalid())?;
        let bytes = significand * 1024f64.powi(power);
        if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
            return Err(invalid());
        }

        Ok(Self(bytes.round() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u64, &str); 3] = [(1 << 30, "G"), (1 << 20, "M"), (1 << 10, "k")];
        for (factor, suffix) in UNITS {
            if self.0 >= factor && self.0 % factor == 0 {
                return write!(f, "{}{}", self.0 / factor, suffix);
            }
        }
        write!(f, "{}", self.0)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ByteSizeVisitor;

        impl Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or a size string such as \"10k\" or \"1.5M\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ByteSize, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ByteSize, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("size cannot be negative: {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ByteSize, E> {
                v.parse().map_err(|e: ContractError| E::custom(e.to_string()))
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_numbers() {
        assert_eq!("1010".parse::<ByteSize>().unwrap(), ByteSize(1010));
        assert_eq!("0".parse::<ByteSize>().unwrap(), ByteSize(0));
    }

    #[test]
    fn test_parse_suffixes() {
        assert_eq!("10k".parse::<ByteSize>().unwrap(), ByteSize(10_240));
        assert_eq!("10M".parse::<ByteSize>().unwrap(), ByteSize(10_485_760));
        assert_eq!("10G".parse::<ByteSize>().unwrap(), ByteSize(10_737_418_240));
    }

    #[test]
    fn test_parse_decimal_significand() {
        assert_eq!("1.5M".parse::<ByteSize>().unwrap(), ByteSize(1_572_864));
        assert_eq!("0.5k".parse::<ByteSize>().unwrap(), ByteSize(512));
    }

    #[test]
    fn test_parse_rejects_unknown_suffix() {
        assert!("10m".parse::<ByteSize>().is_err());
        assert!("k".parse::<ByteSize>().is_err());
        assert!("".parse::<ByteSize>().is_err());
        assert!("-5k".parse::<ByteSize>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(ByteSize(1_048_576).to_string(), "1M");
        assert_eq!(ByteSize(1_572_864).to_string(), "1536k");
        assert_eq!(ByteSize(1000).to_string(), "1000");
    }

    #[test]
    fn test_deserialize_from_int_or_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            size: ByteSize,
        }

        let from_int: Wrapper = toml::from_str("size = 2048").unwrap();
        assert_eq!(from_int.size, ByteSize(2048));

        let from_str: Wrapper = toml::from_str("size = \"1M\"").unwrap();
        assert_eq!(from_str.size, ByteSize(1_048_576));

        assert!(toml::from_str::<Wrapper>("size = \"3x\"").is_err());
    }
}
