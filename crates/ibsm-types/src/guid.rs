//! 64-bit Global Unique Identifiers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 64-bit GUID identifying a port or node. Hardware-stable: the same
/// physical port reports the same GUID across reboots, which is what
/// makes it usable as the key of the persistent LID assignment store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Guid(u64);

impl Guid {
    pub const ZERO: Guid = Guid(0);

    pub const fn new(value: u64) -> Self {
        Guid(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<u64> for Guid {
    fn from(value: u64) -> Self {
        Guid(value)
    }
}

impl FromStr for Guid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        u64::from_str_radix(digits, 16)
            .map(Guid)
            .map_err(|_| ParseError::InvalidGuid(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse() {
        assert_eq!(
            "0x0002c90300001234".parse::<Guid>().unwrap(),
            Guid::new(0x0002_c903_0000_1234)
        );
        assert_eq!("1234".parse::<Guid>().unwrap(), Guid::new(0x1234));
        assert!("zz".parse::<Guid>().is_err());
        assert!("".parse::<Guid>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let guid = Guid::new(0x0002_c903_0000_1234);
        assert_eq!(guid.to_string(), "0x0002c90300001234");
        assert_eq!(guid.to_string().parse::<Guid>().unwrap(), guid);
    }

    #[test]
    fn test_zero() {
        assert!(Guid::ZERO.is_zero());
        assert!(!Guid::new(1).is_zero());
    }
}
