//! Synthetic frame construction for tests, benchmarks and replay tooling

use crate::parser::{ETHERTYPE_IPV4, ETH_HEADER_LEN, TCP_HEADER_LEN, UDP_HEADER_LEN};
use depwall_common::{IpProtocol, MacAddr};
use std::net::Ipv4Addr;

/// Builds Ethernet / IPv4 / TCP|UDP frames with correct header fields
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    src_mac: MacAddr,
    dst_mac: MacAddr,
    ethertype: u16,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: IpProtocol,
    ihl: u8,
    src_port: u16,
    dst_port: u16,
    payload: usize,
}

impl FrameBuilder {
    fn base() -> Self {
        Self {
            src_mac: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            dst_mac: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]),
            ethertype: ETHERTYPE_IPV4,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::UNSPECIFIED,
            protocol: IpProtocol::TCP,
            ihl: 5,
            src_port: 0,
            dst_port: 0,
            payload: 0,
        }
    }

    /// Ethernet-only frame with the given ether-type
    pub fn ethernet(ethertype: u16) -> Self {
        Self {
            ethertype,
            payload: 46,
            ..Self::base()
        }
    }

    /// IPv4 frame with an arbitrary protocol and no transport header
    pub fn ipv4(protocol: IpProtocol, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self {
            protocol,
            src_ip: src,
            dst_ip: dst,
            ..Self::base()
        }
    }

    /// IPv4 + TCP frame
    pub fn tcp(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            ..Self::ipv4(IpProtocol::TCP, src, dst)
        }
    }

    /// IPv4 + UDP frame
    pub fn udp(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            ..Self::ipv4(IpProtocol::UDP, src, dst)
        }
    }

    /// Link-layer source
    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.src_mac = mac;
        self
    }

    /// Link-layer destination
    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.dst_mac = mac;
        self
    }

    /// IPv4 header length in 32-bit words (5..=15); words past 5 are zeroed options
    pub fn ihl(mut self, words: u8) -> Self {
        self.ihl = words.clamp(5, 15);
        self
    }

    /// Zero-filled payload length
    pub fn payload(mut self, len: usize) -> Self {
        self.payload = len;
        self
    }

    /// Serialize the frame
    pub fn build(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ETH_HEADER_LEN + 60 + TCP_HEADER_LEN + self.payload);
        frame.extend_from_slice(&self.dst_mac.octets());
        frame.extend_from_slice(&self.src_mac.octets());
        frame.extend_from_slice(&self.ethertype.to_be_bytes());

        if self.ethertype != ETHERTYPE_IPV4 {
            frame.resize(frame.len() + self.payload, 0);
            return frame;
        }

        let l4_len = match self.protocol {
            IpProtocol::TCP => TCP_HEADER_LEN,
            IpProtocol::UDP => UDP_HEADER_LEN,
            _ => 0,
        };
        let ip_header_len = self.ihl as usize * 4;
        let total_len = (ip_header_len + l4_len + self.payload) as u16;

        let ip_start = frame.len();
        frame.push(0x40 | self.ihl);
        frame.push(0); // tos
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0]); // id
        frame.extend_from_slice(&0x4000u16.to_be_bytes()); // DF
        frame.push(64); // ttl
        frame.push(self.protocol.0);
        frame.extend_from_slice(&[0, 0]); // checksum placeholder
        frame.extend_from_slice(&self.src_ip.octets());
        frame.extend_from_slice(&self.dst_ip.octets());
        frame.resize(ip_start + ip_header_len, 0);

        let checksum = ipv4_checksum(&frame[ip_start..ip_start + ip_header_len]);
        frame[ip_start + 10..ip_start + 12].copy_from_slice(&checksum.to_be_bytes());

        match self.protocol {
            IpProtocol::TCP => {
                frame.extend_from_slice(&self.src_port.to_be_bytes());
                frame.extend_from_slice(&self.dst_port.to_be_bytes());
                frame.extend_from_slice(&[0; 8]); // seq, ack
                frame.push(0x50); // data offset 5
                frame.push(0x02); // SYN
                frame.extend_from_slice(&0xffffu16.to_be_bytes()); // window
                frame.extend_from_slice(&[0; 4]); // checksum, urgent
            }
            IpProtocol::UDP => {
                let udp_len = (UDP_HEADER_LEN + self.payload) as u16;
                frame.extend_from_slice(&self.src_port.to_be_bytes());
                frame.extend_from_slice(&self.dst_port.to_be_bytes());
                frame.extend_from_slice(&udp_len.to_be_bytes());
                frame.extend_from_slice(&[0, 0]);
            }
            _ => {}
        }

        frame.resize(frame.len() + self.payload, 0);
        frame
    }
}

/// RFC 1071 one's-complement header checksum
pub fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|pair| {
            let hi = pair[0] as u32;
            let lo = pair.get(1).copied().unwrap_or(0) as u32;
            (hi << 8) | lo
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let frame = FrameBuilder::tcp(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 1234, 80)
            .build();
        assert_eq!(frame.len(), 54);
        assert_eq!(&frame[12..14], &[0x08, 0x00]);
        assert_eq!(frame[14], 0x45);
        assert_eq!(frame[23], 6);
        assert_eq!(&frame[26..30], &[10, 0, 0, 1]);
        assert_eq!(&frame[34..36], &1234u16.to_be_bytes());
    }

    #[test]
    fn test_checksum_verifies() {
        let frame = FrameBuilder::udp(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(8, 8, 8, 8), 5000, 53)
            .payload(12)
            .build();
        // Summing a header that includes its own checksum yields zero
        assert_eq!(ipv4_checksum(&frame[14..34]), 0);
    }
}
