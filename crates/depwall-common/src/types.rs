//! Value types shared by the policy tables and the data plane

use crate::error::DepwallError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary admission decision for one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Verdict {
    /// Admit the frame
    Pass = 0,
    /// Reject the frame
    Drop = 1,
}

impl Verdict {
    /// True for `Pass`
    #[inline(always)]
    pub const fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Drop => f.write_str("DROP"),
        }
    }
}

/// IP protocol number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct IpProtocol(pub u8);

impl IpProtocol {
    /// ICMP
    pub const ICMP: Self = Self(1);
    /// TCP
    pub const TCP: Self = Self(6);
    /// UDP
    pub const UDP: Self = Self(17);

    /// TCP or UDP, the protocols that carry ports and get session tracking
    #[inline(always)]
    pub const fn has_ports(self) -> bool {
        self.0 == Self::TCP.0 || self.0 == Self::UDP.0
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ICMP => f.write_str("icmp"),
            Self::TCP => f.write_str("tcp"),
            Self::UDP => f.write_str("udp"),
            Self(other) => write!(f, "proto-{}", other),
        }
    }
}

/// 48-bit link-layer (Ethernet) address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Create from raw octets
    #[inline(always)]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets
    #[inline(always)]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

impl FromStr for MacAddr {
    type Err = DepwallError;

    /// Accepts `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| DepwallError::InvalidMac(s.to_string()))?;
            if part.len() != 2 {
                return Err(DepwallError::InvalidMac(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| DepwallError::InvalidMac(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(DepwallError::InvalidMac(s.to_string()));
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = DepwallError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}
