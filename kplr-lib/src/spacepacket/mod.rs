//! Kepler CCSDS packet headers.
//!
//! Kepler science packets carry a 14 byte header: the standard 6 byte CCSDS primary
//! header followed by a 40 bit spacecraft timestamp, a packet id and two destination
//! bytes.
//!
//! References:
//! * CCSDS Space Packet Protocol 133.0-B-1
mod error;
mod stats;

use std::borrow::Cow;
use std::fmt::Display;

use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::{Error, Result};

pub use error::ValidationError;
pub use stats::Statistics;

pub type Apid = u16;
pub type PacketId = u8;

/// Long cadence science data.
pub const LONG_CADENCE: Apid = 40;
/// Short cadence science data.
pub const SHORT_CADENCE: Apid = 41;
/// Full frame images.
pub const FFI_CADENCE: Apid = 42;
/// Idle/fill packets.
pub const FILL_PACKET: Apid = 2047;

pub const BASELINE: PacketId = 100;
pub const RESIDUAL_BASELINE: PacketId = 101;
pub const ENCODED: PacketId = 102;
pub const RAW: PacketId = 103;
pub const REQUANTIZED: PacketId = 104;
/// Byte value marking fill/pad data. As a packet id it is accepted; as the first header
/// byte it marks the whole header as fill.
pub const FILL_BYTE: u8 = 0x5a;

/// Value of the sequence flags for unsegmented user data.
pub const SEQ_UNSEGMENTED: u8 = 3;

/// Scale of one sub-second timestamp count.
pub const SUBSECOND_SCALE: f64 = 0.004096;

/// Kepler CCSDS packet header.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct CcsdsHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    pub sequence_flags: u8,
    pub sequence_count: u16,
    /// Raw packet data length field. The total packet length is this plus
    /// [CcsdsHeader::PRIMARY_LEN].
    pub data_length: u16,
    /// 40 bit composite of 32 bits of seconds and 8 bits of sub-seconds.
    pub timestamp: u64,
    pub packet_id: PacketId,
    pub destination_apid: u8,
    pub destination_id: u8,
    /// Header bytes exactly as read
    pub raw: [u8; Self::LEN],
}

impl CcsdsHeader {
    /// Size of the complete header in bytes
    pub const LEN: usize = 14;
    /// Bytes added to the packet data length field to get the total packet length.
    pub const PRIMARY_LEN: usize = 7;
    /// Maximum total packet length
    pub const MAX_PACKET_LEN: usize = 16380;
    pub const SEQ_MAX: u16 = 16383;

    /// Decode a header. All bit patterns decode; use [CcsdsHeader::validate] to check
    /// the result.
    #[must_use]
    pub fn decode(buf: &[u8; Self::LEN]) -> Self {
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        CcsdsHeader {
            version: (d1 >> 13 & 0x7) as u8,
            type_flag: (d1 >> 12 & 0x1) as u8,
            has_secondary_header: (d1 >> 11 & 0x1) == 1,
            apid: (d1 & 0x7ff),
            sequence_flags: (d2 >> 14 & 0x3) as u8,
            sequence_count: (d2 & 0x3fff),
            data_length: d3,
            timestamp: u64::from_be_bytes([
                0, 0, 0, buf[6], buf[7], buf[8], buf[9], buf[10],
            ]),
            packet_id: buf[11],
            destination_apid: buf[12],
            destination_id: buf[13],
            raw: *buf,
        }
    }

    /// Decode from the start of `buf`.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `buf` is shorter than [CcsdsHeader::LEN].
    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        let Some(raw) = buf.get(..Self::LEN) else {
            return Err(Error::NotEnoughData {
                actual: buf.len(),
                minimum: Self::LEN,
            });
        };
        let mut bytes = [0u8; Self::LEN];
        bytes.copy_from_slice(raw);
        Ok(Self::decode(&bytes))
    }

    /// Total length of the packet on the wire, header included.
    #[must_use]
    pub fn packet_length(&self) -> usize {
        self.data_length as usize + Self::PRIMARY_LEN
    }

    #[must_use]
    pub fn timestamp_seconds(&self) -> u32 {
        (self.timestamp >> 8) as u32
    }

    /// Sub-second part of the timestamp in counts of [SUBSECOND_SCALE].
    #[must_use]
    pub fn timestamp_milliseconds(&self) -> u8 {
        (self.timestamp & 0xff) as u8
    }

    #[must_use]
    pub fn timestamp_float(&self) -> f64 {
        f64::from(self.timestamp_seconds())
            + SUBSECOND_SCALE * f64::from(self.timestamp_milliseconds())
    }

    /// True when the first header byte is the fill byte, i.e., there is no real header
    /// here. Must be checked before [CcsdsHeader::validate].
    #[must_use]
    pub fn is_fill(&self) -> bool {
        self.raw[0] == FILL_BYTE
    }

    /// Check the header against the Kepler packet profile.
    ///
    /// # Errors
    /// The first field found to be invalid.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.version != 0 {
            return Err(ValidationError::Version {
                actual: self.version,
            });
        }
        if self.type_flag != 0 {
            return Err(ValidationError::Type {
                actual: self.type_flag,
            });
        }
        if self.sequence_flags != SEQ_UNSEGMENTED {
            return Err(ValidationError::SequenceFlags {
                actual: self.sequence_flags,
            });
        }
        if !matches!(
            self.apid,
            LONG_CADENCE | SHORT_CADENCE | FFI_CADENCE | FILL_PACKET
        ) {
            return Err(ValidationError::Apid { actual: self.apid });
        }
        if !valid_packet_id(self.packet_id) {
            return Err(ValidationError::PacketId {
                actual: self.packet_id,
            });
        }
        if self.packet_length() > Self::MAX_PACKET_LEN {
            return Err(ValidationError::PacketLength {
                actual: self.packet_length(),
                maximum: Self::MAX_PACKET_LEN,
            });
        }
        Ok(())
    }

    /// True if `other` belongs to a different stream or plays a different role.
    #[must_use]
    pub fn packet_type_changed(&self, other: &CcsdsHeader) -> bool {
        other.apid != self.apid || other.packet_id != self.packet_id
    }

    /// True if the raw 40 bit timestamps differ.
    #[must_use]
    pub fn timestamp_changed(&self, other: &CcsdsHeader) -> bool {
        other.timestamp != self.timestamp
    }

    #[must_use]
    pub fn product(&self) -> Option<Product> {
        Product::classify(self.apid, self.packet_id)
    }
}

impl Display for CcsdsHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CcsdsHeader{{apid={} ({}), packet_id={} ({}), seq={}, len={}, time={:.6}}}",
            self.apid,
            classify_apid(self.apid),
            self.packet_id,
            classify_packet_id(self.apid, self.packet_id),
            self.sequence_count,
            self.packet_length(),
            self.timestamp_float(),
        )
    }
}

fn valid_packet_id(packet_id: PacketId) -> bool {
    if matches!(
        packet_id,
        BASELINE | RESIDUAL_BASELINE | ENCODED | RAW | REQUANTIZED | FILL_BYTE
    ) {
        return true;
    }
    // module specific extension codes, e.g., FFI module numbers
    (102..=104).contains(&packet_id)
        || (106..=120).contains(&packet_id)
        || (122..=124).contains(&packet_id)
}

/// Human readable name of an APID.
#[must_use]
pub fn classify_apid(apid: Apid) -> &'static str {
    match apid {
        LONG_CADENCE => "long cadence",
        SHORT_CADENCE => "short cadence",
        FFI_CADENCE => "ffi",
        FILL_PACKET => "fill packet",
        _ => "unknown",
    }
}

/// Human readable name of a packet id. FFI packet ids name the CCD module.
#[must_use]
pub fn classify_packet_id(apid: Apid, packet_id: PacketId) -> Cow<'static, str> {
    if apid == FFI_CADENCE && (100..=124).contains(&packet_id) {
        return Cow::Owned(format!("module {}", packet_id - 100));
    }
    Cow::Borrowed(match packet_id {
        BASELINE => "baseline",
        RESIDUAL_BASELINE => "residual baseline",
        ENCODED => "encoded",
        RAW => "raw",
        REQUANTIZED => "requantized",
        FILL_BYTE => "fill",
        _ => "unknown",
    })
}

/// The science products that are counted and tracked individually.
///
/// Raw and requantized long/short cadence packets are deliberately not products.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    LongCadenceBaseline,
    LongCadenceResidual,
    LongCadenceEncoded,
    ShortCadenceBaseline,
    ShortCadenceResidual,
    ShortCadenceEncoded,
    FullFrameImage,
}

impl Product {
    #[must_use]
    pub fn classify(apid: Apid, packet_id: PacketId) -> Option<Self> {
        match (apid, packet_id) {
            (LONG_CADENCE, BASELINE) => Some(Self::LongCadenceBaseline),
            (LONG_CADENCE, RESIDUAL_BASELINE) => Some(Self::LongCadenceResidual),
            (LONG_CADENCE, ENCODED) => Some(Self::LongCadenceEncoded),
            (SHORT_CADENCE, BASELINE) => Some(Self::ShortCadenceBaseline),
            (SHORT_CADENCE, RESIDUAL_BASELINE) => Some(Self::ShortCadenceResidual),
            (SHORT_CADENCE, ENCODED) => Some(Self::ShortCadenceEncoded),
            (FFI_CADENCE, _) => Some(Self::FullFrameImage),
            _ => None,
        }
    }

    /// Products with a tracked sequence counter. FFI packets are not tracked.
    #[must_use]
    pub fn is_sequenced(&self) -> bool {
        *self != Self::FullFrameImage
    }

    /// Size of one pixel for products with fixed size pixels.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::LongCadenceBaseline | Self::ShortCadenceBaseline => Some(4),
            Self::LongCadenceResidual | Self::ShortCadenceResidual => Some(2),
            _ => None,
        }
    }

    /// DMC output file extension.
    #[must_use]
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::LongCadenceBaseline => Some("lcb"),
            Self::LongCadenceResidual => Some("lcr"),
            Self::LongCadenceEncoded => Some("lcs"),
            Self::ShortCadenceBaseline => Some("scb"),
            Self::ShortCadenceResidual => Some("scr"),
            Self::ShortCadenceEncoded => Some("scs"),
            Self::FullFrameImage => None,
        }
    }
}

/// Field values used to encode a header, primarily for generating synthetic streams.
///
/// ```
/// use kplr::spacepacket::{CcsdsHeader, HeaderFields, LONG_CADENCE, BASELINE};
///
/// let bytes = HeaderFields::builder()
///     .apid(LONG_CADENCE)
///     .packet_id(BASELINE)
///     .sequence_count(7)
///     .data_length(100)
///     .build()
///     .encode();
/// let header = CcsdsHeader::decode(&bytes);
/// assert_eq!(header.sequence_count, 7);
/// assert!(header.validate().is_ok());
/// ```
#[derive(TypedBuilder, Debug, Clone, Copy)]
pub struct HeaderFields {
    #[builder(default)]
    pub version: u8,
    #[builder(default)]
    pub type_flag: u8,
    #[builder(default)]
    pub has_secondary_header: bool,
    pub apid: Apid,
    #[builder(default = SEQ_UNSEGMENTED)]
    pub sequence_flags: u8,
    #[builder(default)]
    pub sequence_count: u16,
    pub data_length: u16,
    #[builder(default)]
    pub seconds: u32,
    #[builder(default)]
    pub subseconds: u8,
    pub packet_id: PacketId,
    #[builder(default)]
    pub destination_apid: u8,
    #[builder(default)]
    pub destination_id: u8,
}

impl HeaderFields {
    #[must_use]
    pub fn encode(&self) -> [u8; CcsdsHeader::LEN] {
        let d1 = (u16::from(self.version & 0x7) << 13)
            | (u16::from(self.type_flag & 0x1) << 12)
            | (u16::from(self.has_secondary_header) << 11)
            | (self.apid & 0x7ff);
        let d2 = (u16::from(self.sequence_flags & 0x3) << 14) | (self.sequence_count & 0x3fff);

        let mut buf = [0u8; CcsdsHeader::LEN];
        buf[0..2].copy_from_slice(&d1.to_be_bytes());
        buf[2..4].copy_from_slice(&d2.to_be_bytes());
        buf[4..6].copy_from_slice(&self.data_length.to_be_bytes());
        buf[6..10].copy_from_slice(&self.seconds.to_be_bytes());
        buf[10] = self.subseconds;
        buf[11] = self.packet_id;
        buf[12] = self.destination_apid;
        buf[13] = self.destination_id;
        buf
    }
}
