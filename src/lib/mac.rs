use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Every generated address starts with this prefix; the locally administered
/// bit is set, so it never collides with a vendor range.
pub const MAC_PREFIX: &str = "0e:37:6a";

lazy_static! {
    pub static ref MAC_REGEX: Regex =
        Regex::new("^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacAddress(String);

impl MacAddress {
    /// A fresh address under [`MAC_PREFIX`]. Uniqueness is not guaranteed.
    pub fn random() -> MacAddress {
        let octets: [u8; 3] = rand::random();
        MacAddress(format!(
            "{MAC_PREFIX}:{:02x}:{:02x}:{:02x}",
            octets[0], octets[1], octets[2]
        ))
    }

    pub fn is_valid(s: &str) -> bool {
        MAC_REGEX.is_match(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if MacAddress::is_valid(s) {
            Ok(MacAddress(s.to_ascii_lowercase()))
        } else {
            Err(format!("{s} is not a valid MAC address"))
        }
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn random_mac() -> String {
    MacAddress::random().to_string()
}
