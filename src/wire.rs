//! On-wire packet layout and the public status codes.
//!
//! Every field is little-endian and packed; there is no alignment padding to
//! preserve because every field here is decoded and encoded by hand rather
//! than transmuted from a `#[repr(C)]` struct.

/// Receiver listens on this port.
pub const MAGIC_PORT: u16 = 22345;

/// Maximum UDP payload this protocol ever builds, header included.
pub const MTU: usize = 1472;

/// `Flags` + `Sequence`, the header every sender-originated packet carries.
pub const HEADER_LEN: usize = 8;

/// Largest chunk of application data a single DATA packet may carry.
pub const MAX_PAYLOAD: usize = MTU - HEADER_LEN;

/// Bound on retransmissions of the oldest unacknowledged slot.
pub const MAX_RETX: u32 = 50;

/// Default initial retransmission timeout, in seconds.
pub const DEFAULT_INITIAL_RTO: f64 = 1.0;

const MAGIC_PROTOCOL: u32 = 0x8311AA;

/// The reserved:5, Syn:1, Ack:1, Fin:1, Magic:24 bitfield, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
}

impl Flags {
    pub fn syn() -> Self {
        Flags { syn: true, ..Flags::default() }
    }

    pub fn fin() -> Self {
        Flags { fin: true, ..Flags::default() }
    }

    pub fn to_u32(self) -> u32 {
        let mut word = MAGIC_PROTOCOL << 8;
        if self.syn {
            word |= 1 << 5;
        }
        if self.ack {
            word |= 1 << 6;
        }
        if self.fin {
            word |= 1 << 7;
        }
        word
    }

    /// Returns `None` if the magic field doesn't match, or a reserved bit is set.
    pub fn from_u32(word: u32) -> Option<Self> {
        if word & 0x1F != 0 {
            return None;
        }
        if (word >> 8) != MAGIC_PROTOCOL {
            return None;
        }
        Some(Flags {
            syn: word & (1 << 5) != 0,
            ack: word & (1 << 6) != 0,
            fin: word & (1 << 7) != 0,
        })
    }
}

/// `Flags` + `Sequence`, common to SYN/DATA/FIN packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderDataHeader {
    pub flags: Flags,
    pub sequence: u32,
}

impl SenderDataHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.flags.to_u32().to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Option<(Self, &[u8])> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let flags = Flags::from_u32(u32::from_le_bytes(buf[0..4].try_into().unwrap()))?;
        let sequence = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        Some((SenderDataHeader { flags, sequence }, &buf[HEADER_LEN..]))
    }
}

/// Propagation/loss/bandwidth parameters conveyed on the SYN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkProperties {
    /// Propagation RTT, in seconds.
    pub rtt: f32,
    /// Bottleneck bandwidth, in bits/sec.
    pub speed: f32,
    /// Loss probability, forward then return path.
    pub loss: [f32; 2],
    /// Emulated router buffer size, in packets.
    pub buffer_size: u32,
}

pub const LINK_PROPERTIES_LEN: usize = 4 + 4 + 4 + 4 + 4;

impl LinkProperties {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.rtt.to_le_bytes());
        out.extend_from_slice(&self.speed.to_le_bytes());
        out.extend_from_slice(&self.loss[0].to_le_bytes());
        out.extend_from_slice(&self.loss[1].to_le_bytes());
        out.extend_from_slice(&self.buffer_size.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Option<(Self, &[u8])> {
        if buf.len() < LINK_PROPERTIES_LEN {
            return None;
        }
        let rtt = f32::from_le_bytes(buf[0..4].try_into().unwrap());
        let speed = f32::from_le_bytes(buf[4..8].try_into().unwrap());
        let loss0 = f32::from_le_bytes(buf[8..12].try_into().unwrap());
        let loss1 = f32::from_le_bytes(buf[12..16].try_into().unwrap());
        let buffer_size = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        Some((
            LinkProperties { rtt, speed, loss: [loss0, loss1], buffer_size },
            &buf[LINK_PROPERTIES_LEN..],
        ))
    }
}

/// SYN packet: header plus the sender's emulated link parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SenderSynHeader {
    pub header: SenderDataHeader,
    pub link_properties: LinkProperties,
}

impl SenderSynHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + LINK_PROPERTIES_LEN);
        self.header.encode(&mut out);
        self.link_properties.encode(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        let (header, rest) = SenderDataHeader::decode(buf)?;
        let (link_properties, _) = LinkProperties::decode(rest)?;
        Some(SenderSynHeader { header, link_properties })
    }
}

/// Receiver-to-sender reply: cumulative ack plus flow-control window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverHeader {
    pub flags: Flags,
    pub receiver_window: u32,
    pub ack_sequence: u32,
}

pub const RECEIVER_HEADER_LEN: usize = 4 + 4 + 4;

impl ReceiverHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECEIVER_HEADER_LEN);
        out.extend_from_slice(&self.flags.to_u32().to_le_bytes());
        out.extend_from_slice(&self.receiver_window.to_le_bytes());
        out.extend_from_slice(&self.ack_sequence.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECEIVER_HEADER_LEN {
            return None;
        }
        let flags = Flags::from_u32(u32::from_le_bytes(buf[0..4].try_into().unwrap()))?;
        let receiver_window = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let ack_sequence = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        Some(ReceiverHeader { flags, receiver_window, ack_sequence })
    }
}

/// Outcomes of `SenderSocket::open`/`send`/`close`. The numeric values are
/// part of the protocol's status-code convention and are fixed accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    AlreadyConnected = 1,
    NotConnected = 2,
    InvalidName = 3,
    FailedSend = 4,
    Timeout = 5,
    FailedRecv = 6,
}

/// Internal-only ack-loop outcomes; never cross `SenderSocket`'s public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    Valid,
    InvalidAck,
    SelectTimeout,
    FastRetx,
    Fatal(Status),
}
