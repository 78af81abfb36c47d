//! Hardware (MAC) addresses.

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;

/// An EUI-48 hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = ParseError;

    /// Accepts `0a:00:27:00:00:00`, `0a-00-27-00-00-00` and `0a00.2700.0000`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::Mac(s.to_string());
        let mut octets = [0u8; 6];

        if s.len() == 17 {
            let sep = s.as_bytes()[2];
            if sep != b':' && sep != b'-' {
                return Err(invalid());
            }
            let mut groups = s.split(sep as char);
            for octet in &mut octets {
                let group = groups.next().ok_or_else(invalid)?;
                *octet = parse_hex_octet(group).ok_or_else(invalid)?;
            }
            if groups.next().is_some() {
                return Err(invalid());
            }
            return Ok(Self(octets));
        }

        if s.len() == 14 {
            let mut groups = s.split('.');
            for pair in octets.chunks_mut(2) {
                let group = groups.next().ok_or_else(invalid)?;
                if group.len() != 4 || !group.is_ascii() {
                    return Err(invalid());
                }
                pair[0] = parse_hex_octet(&group[..2]).ok_or_else(invalid)?;
                pair[1] = parse_hex_octet(&group[2..]).ok_or_else(invalid)?;
            }
            if groups.next().is_some() {
                return Err(invalid());
            }
            return Ok(Self(octets));
        }

        Err(invalid())
    }
}

fn parse_hex_octet(group: &str) -> Option<u8> {
    if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(group, 16).ok()
}
