//! Helper types for the x402 wire format.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A `u64` value that serializes as a decimal string.
///
/// Token amounts in payment requirements (`maxAmountRequired`) travel as strings so that
/// JavaScript clients do not lose precision.
///
/// ```rust
/// use x402_types::proto::util::U64String;
///
/// let value = U64String::from(12345678901234567890u64);
/// let json = serde_json::to_string(&value).unwrap();
/// assert_eq!(json, "\"12345678901234567890\"");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct U64String(u64);

impl U64String {
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl FromStr for U64String {
    type Err = <u64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

impl From<u64> for U64String {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<U64String> for u64 {
    fn from(value: U64String) -> Self {
        value.0
    }
}

impl fmt::Display for U64String {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for U64String {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for U64String {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(Self).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_numeric_json_and_garbage() {
        assert!(serde_json::from_str::<U64String>("1000").is_err());
        assert!(serde_json::from_str::<U64String>("\"-1\"").is_err());
        assert!(serde_json::from_str::<U64String>("\"1e6\"").is_err());
        let parsed: U64String = serde_json::from_str("\"1000000\"").unwrap();
        assert_eq!(parsed.inner(), 1_000_000);
    }
}
