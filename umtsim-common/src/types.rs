//! Core UMTS identity types: PLMN, registration area, IMSI, CN domain,
//! flow classifiers and QoS descriptors.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Radio cell identity (UTRAN cell id).
pub type CellId = u32;

/// Public Land Mobile Network identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PlmnId {
    /// Mobile Country Code (3 digits)
    pub mcc: u16,
    /// Mobile Network Code (2-3 digits)
    pub mnc: u16,
}

impl PlmnId {
    /// Creates a new PLMN identity.
    pub const fn new(mcc: u16, mnc: u16) -> Self {
        Self { mcc, mnc }
    }

    /// Returns true if this PLMN has values set.
    pub fn has_value(&self) -> bool {
        self.mcc > 0 || self.mnc > 0
    }

    /// Packs the PLMN into 4 bytes (MCC then MNC, big-endian).
    pub fn to_u32(&self) -> u32 {
        (u32::from(self.mcc) << 16) | u32::from(self.mnc)
    }

    /// Inverse of [`PlmnId::to_u32`].
    pub fn from_u32(v: u32) -> Self {
        Self {
            mcc: (v >> 16) as u16,
            mnc: (v & 0xFFFF) as u16,
        }
    }
}

impl fmt::Debug for PlmnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlmnId({:03}-{:02})", self.mcc, self.mnc)
    }
}

impl fmt::Display for PlmnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}{:02}", self.mcc, self.mnc)
    }
}

/// Location/routing area identity.
///
/// CS mobility management tracks the location area (PLMN + LAC), PS mobility
/// management tracks the routing area (location area + RAC). A cell
/// broadcasts both in SIB1/SIB3 and the UE keeps one combined value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RegAreaId {
    /// Serving PLMN
    pub plmn: PlmnId,
    /// Location area code
    pub lac: u16,
    /// Routing area code
    pub rac: u8,
}

impl RegAreaId {
    /// Creates a new registration area identity.
    pub const fn new(plmn: PlmnId, lac: u16, rac: u8) -> Self {
        Self { plmn, lac, rac }
    }

    /// Returns true if the location area parts (PLMN + LAC) match.
    pub fn same_location_area(&self, other: &RegAreaId) -> bool {
        self.plmn == other.plmn && self.lac == other.lac
    }
}

impl fmt::Display for RegAreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04x}-{:02x}", self.plmn, self.lac, self.rac)
    }
}

/// International Mobile Subscriber Identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Imsi(pub String);

impl Imsi {
    /// Creates an IMSI from a digit string.
    pub fn new(digits: impl Into<String>) -> Self {
        Self(digits.into())
    }

    /// Returns true if the IMSI consists of 6 to 15 decimal digits.
    pub fn is_valid(&self) -> bool {
        (6..=15).contains(&self.0.len()) && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    /// Numeric value of the lowest 9 digits, used as a compact UE identity
    /// in RRC CONNECTION REQUEST.
    pub fn short_id(&self) -> u32 {
        let tail = if self.0.len() > 9 { &self.0[self.0.len() - 9..] } else { &self.0 };
        tail.parse().unwrap_or(0)
    }
}

impl fmt::Display for Imsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "imsi-{}", self.0)
    }
}

/// Core network domain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum CnDomain {
    /// Circuit switched
    Cs = 0,
    /// Packet switched
    Ps = 1,
}

impl CnDomain {
    /// Both domains, in index order.
    pub const ALL: [CnDomain; 2] = [CnDomain::Cs, CnDomain::Ps];

    /// Index into per-domain arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CnDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CnDomain::Cs => write!(f, "CS"),
            CnDomain::Ps => write!(f, "PS"),
        }
    }
}

/// Which side started a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowDirection {
    /// Originated by the UE
    MobileOriginated,
    /// Originated by the network
    NetworkOriginated,
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowDirection::MobileOriginated => write!(f, "MO"),
            FlowDirection::NetworkOriginated => write!(f, "NO"),
        }
    }
}

/// UMTS traffic class.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(u8)]
pub enum TrafficClass {
    /// Voice-like traffic
    Conversational = 1,
    /// Streaming media
    Streaming = 2,
    /// Request/response traffic
    Interactive = 3,
    /// Best effort
    #[default]
    Background = 4,
}

/// QoS descriptor attached to a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QosDescriptor {
    /// Traffic class
    pub traffic_class: TrafficClass,
    /// Maximum uplink bit rate (kbit/s)
    pub max_bitrate_ul_kbps: u32,
    /// Maximum downlink bit rate (kbit/s)
    pub max_bitrate_dl_kbps: u32,
}

impl QosDescriptor {
    /// Conversational 12.2 kbit/s voice descriptor.
    pub const VOICE: QosDescriptor = QosDescriptor {
        traffic_class: TrafficClass::Conversational,
        max_bitrate_ul_kbps: 12,
        max_bitrate_dl_kbps: 12,
    };
}

/// Identifies the packets belonging to one application flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FlowClassifier {
    /// Source address (host order IPv4)
    pub src_addr: u32,
    /// Destination address (host order IPv4)
    pub dst_addr: u32,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// IP protocol number
    pub protocol: u8,
}

impl FlowClassifier {
    /// Creates a classifier for the given 5-tuple.
    pub fn new(src_addr: u32, dst_addr: u32, src_port: u16, dst_port: u16, protocol: u8) -> Self {
        Self { src_addr, dst_addr, src_port, dst_port, protocol }
    }

    /// The same flow seen from the other end.
    pub fn reversed(&self) -> Self {
        Self {
            src_addr: self.dst_addr,
            dst_addr: self.src_addr,
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }
}

impl fmt::Display for FlowClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}:{}/{}",
            std::net::Ipv4Addr::from(self.src_addr),
            self.src_port,
            std::net::Ipv4Addr::from(self.dst_addr),
            self.dst_port,
            self.protocol
        )
    }
}
