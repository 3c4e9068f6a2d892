//! L2-L4 header parser
//!
//! Ethernet → IPv4 → TCP/UDP, each layer gated by a bounds check on the
//! cursor. Pure function of the input bytes; all multi-byte fields are
//! converted from network to host order as they are read.

use crate::cursor::{Cursor, OutOfBounds};
use depwall_common::{IpProtocol, MacAddr};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Ethernet II header length
pub const ETH_HEADER_LEN: usize = 14;
/// IPv4 ether-type
pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// IPv4 header without options
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// TCP header without options
pub const TCP_HEADER_LEN: usize = 20;
/// UDP header
pub const UDP_HEADER_LEN: usize = 8;

/// Header layer, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Ethernet II
    Ethernet,
    /// IPv4
    Ipv4,
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::Ethernet => "ethernet",
            Layer::Ipv4 => "ipv4",
            Layer::Tcp => "tcp",
            Layer::Udp => "udp",
        })
    }
}

/// Malformed frame
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A header did not fit before the end of the buffer
    #[error("truncated {layer} header: {bounds}")]
    Truncated {
        /// Layer being parsed
        layer: Layer,
        /// Failed read
        bounds: OutOfBounds,
    },

    /// IHL below the 5-word minimum
    #[error("bad IPv4 header length {0} words")]
    BadHeaderLength(u8),
}

impl ParseError {
    fn truncated(layer: Layer) -> impl Fn(OutOfBounds) -> ParseError {
        move |bounds| ParseError::Truncated { layer, bounds }
    }
}

/// Transport ports (host order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ports {
    /// Source port
    pub src: u16,
    /// Destination port
    pub dst: u16,
}

/// Read-only view of one frame's headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeaders {
    /// Link-layer source
    pub src_mac: MacAddr,
    /// Link-layer destination
    pub dst_mac: MacAddr,
    /// Network-layer source
    pub src_ip: Ipv4Addr,
    /// Network-layer destination
    pub dst_ip: Ipv4Addr,
    /// Transport protocol
    pub protocol: IpProtocol,
    /// Ports, for TCP and UDP only
    pub ports: Option<Ports>,
}

/// Successful parse result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// IPv4 frame, headers extracted
    Ipv4(ParsedHeaders),
    /// Well-formed Ethernet frame carrying something other than IPv4
    NotApplicable {
        /// The frame's ether-type
        ethertype: u16,
    },
}

/// Parse a raw frame.
///
/// Returns `Err` only for frames whose headers do not fit or are invalid;
/// a non-IPv4 ether-type is `Ok(NotApplicable)`.
#[inline]
pub fn parse(frame: &[u8]) -> Result<ParseOutcome, ParseError> {
    let mut cur = Cursor::new(frame);

    // Ethernet
    let mut eth = cur
        .sub(ETH_HEADER_LEN)
        .map_err(ParseError::truncated(Layer::Ethernet))?;
    let (dst_mac, src_mac, ethertype) = read_ethernet(&mut eth)
        .map_err(ParseError::truncated(Layer::Ethernet))?;

    if ethertype != ETHERTYPE_IPV4 {
        return Ok(ParseOutcome::NotApplicable { ethertype });
    }

    // IPv4: the fixed part must fit before IHL can be trusted
    cur.ensure(IPV4_MIN_HEADER_LEN)
        .map_err(ParseError::truncated(Layer::Ipv4))?;
    // The ether-type decides the layer; the version nibble is not consulted
    let ihl = cur.read_u8().map_err(ParseError::truncated(Layer::Ipv4))? & 0x0f;
    if (ihl as usize) * 4 < IPV4_MIN_HEADER_LEN {
        return Err(ParseError::BadHeaderLength(ihl));
    }

    // Rest of the declared header, options included
    let mut ip = cur
        .sub(ihl as usize * 4 - 1)
        .map_err(ParseError::truncated(Layer::Ipv4))?;
    let (protocol, src_ip, dst_ip) =
        read_ipv4(&mut ip).map_err(ParseError::truncated(Layer::Ipv4))?;

    // Transport, located by the declared IHL
    let ports = match protocol {
        IpProtocol::TCP => Some(read_ports(&mut cur, TCP_HEADER_LEN, Layer::Tcp)?),
        IpProtocol::UDP => Some(read_ports(&mut cur, UDP_HEADER_LEN, Layer::Udp)?),
        _ => None,
    };

    Ok(ParseOutcome::Ipv4(ParsedHeaders {
        src_mac,
        dst_mac,
        src_ip,
        dst_ip,
        protocol,
        ports,
    }))
}

#[inline(always)]
fn read_ethernet(eth: &mut Cursor<'_>) -> Result<(MacAddr, MacAddr, u16), OutOfBounds> {
    let dst = MacAddr::new(eth.read_array::<6>()?);
    let src = MacAddr::new(eth.read_array::<6>()?);
    let ethertype = eth.read_u16_be()?;
    Ok((dst, src, ethertype))
}

/// Reads from just past the version/IHL byte
#[inline(always)]
fn read_ipv4(ip: &mut Cursor<'_>) -> Result<(IpProtocol, Ipv4Addr, Ipv4Addr), OutOfBounds> {
    // tos, total length, id, flags/fragment, ttl
    ip.skip(8)?;
    let protocol = IpProtocol(ip.read_u8()?);
    // checksum
    ip.skip(2)?;
    let src = Ipv4Addr::from(ip.read_array::<4>()?);
    let dst = Ipv4Addr::from(ip.read_array::<4>()?);
    Ok((protocol, src, dst))
}

#[inline(always)]
fn read_ports(cur: &mut Cursor<'_>, header_len: usize, layer: Layer) -> Result<Ports, ParseError> {
    let mut l4 = cur.sub(header_len).map_err(ParseError::truncated(layer))?;
    let src = l4.read_u16_be().map_err(ParseError::truncated(layer))?;
    let dst = l4.read_u16_be().map_err(ParseError::truncated(layer))?;
    Ok(Ports { src, dst })
}
