//! VCDU transfer frame decoding.
//!
//! Kepler downlink files are a sequence of fixed length VCDUs. Each VCDU starts with a
//! header carrying a frame counter and a first-header-pointer giving the payload offset
//! of the first CCSDS packet header that starts in the frame.
mod locator;
mod packets;

pub use locator::HeaderLocator;
pub use packets::FramedHeaders;

use serde::{Deserialize, Serialize};

use crate::spacepacket::CcsdsHeader;
use crate::{Error, Result};

pub type Scid = u16;
pub type Vcid = u16;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub struct VcduHeader {
    pub version: u8,
    pub scid: Scid,
    pub vcid: Vcid,
    pub counter: u32,
    pub replay: bool,
    /// Payload offset of the first packet header starting in this frame, or one of
    /// [VcduHeader::NO_CCSDS_HEADER] or [VcduHeader::FILL_DATA].
    pub first_header_pointer: u16,
}

impl VcduHeader {
    /// VCDU primary header length in bytes
    pub const PRIMARY_LEN: usize = 6;
    /// Minimum header length: the primary header plus the 2 byte M_PDU header.
    pub const LEN: usize = Self::PRIMARY_LEN + 2;
    /// VCID indicating a fill frame
    pub const FILL: Vcid = 63;
    /// Maximum value of the 24 bit frame counter before rollover
    pub const COUNTER_MAX: u32 = 0xff_ffff;
    /// First-header-pointer value indicating no packet header starts in this frame.
    pub const NO_CCSDS_HEADER: u16 = 0x7ff;
    /// First-header-pointer value indicating the frame payload is idle data.
    pub const FILL_DATA: u16 = 0x7fe;

    /// Decode a complete VCDU header, i.e., exactly the header bytes. Any bytes between
    /// the primary header and the trailing M_PDU header are an insert zone and are
    /// ignored.
    ///
    /// Returns `None` if there are fewer than [VcduHeader::LEN] bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }

        let x = u16::from_be_bytes([dat[0], dat[1]]);
        let mpdu = u16::from_be_bytes([dat[dat.len() - 2], dat[dat.len() - 1]]);
        Some(VcduHeader {
            version: (dat[0] >> 6) & 0x3,
            scid: ((x >> 6) & 0xff),
            vcid: (x & 0x3f),
            counter: u32::from_be_bytes([0, dat[2], dat[3], dat[4]]),
            replay: (dat[5] >> 7) & 0x1 == 1,
            first_header_pointer: mpdu & 0x7ff,
        })
    }

    /// Encode into `geometry.header_length` bytes. Insert zone bytes are zero.
    #[must_use]
    pub fn encode(&self, geometry: &FrameGeometry) -> Vec<u8> {
        let mut dat = vec![0u8; geometry.header_length.max(Self::LEN)];
        let x = (u16::from(self.version & 0x3) << 14) | ((self.scid & 0xff) << 6) | (self.vcid & 0x3f);
        dat[0..2].copy_from_slice(&x.to_be_bytes());
        dat[2..5].copy_from_slice(&self.counter.to_be_bytes()[1..]);
        dat[5] = u8::from(self.replay) << 7;
        let n = dat.len();
        dat[n - 2..].copy_from_slice(&(self.first_header_pointer & 0x7ff).to_be_bytes());
        dat
    }

    /// True for idle frames, either by VCID or by first-header-pointer.
    #[must_use]
    pub fn is_fill(&self) -> bool {
        self.vcid == Self::FILL || self.first_header_pointer == Self::FILL_DATA
    }

    /// False if the frame contains only continuation data.
    #[must_use]
    pub fn has_header(&self) -> bool {
        self.first_header_pointer != Self::NO_CCSDS_HEADER
    }

    #[must_use]
    pub fn header_offset(&self) -> usize {
        self.first_header_pointer as usize
    }
}

/// Fixed size layout of the VCDUs in a downlink file.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub struct FrameGeometry {
    /// Total length of each VCDU, header included.
    pub frame_length: usize,
    /// Length of the VCDU header, including any insert zone and the M_PDU header.
    pub header_length: usize,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            frame_length: 1115,
            header_length: VcduHeader::LEN,
        }
    }
}

impl FrameGeometry {
    #[must_use]
    pub fn payload_length(&self) -> usize {
        self.frame_length - self.header_length
    }

    /// Absolute offset of frame `index`.
    #[must_use]
    pub fn frame_start(&self, index: u64) -> u64 {
        index * self.frame_length as u64
    }

    /// A payload must be able to hold a full packet header so that a header is split
    /// across at most two frames.
    ///
    /// # Errors
    /// [Error::Config] describing the problem.
    pub fn validate(&self) -> Result<()> {
        if self.header_length < VcduHeader::LEN {
            return Err(Error::Config(format!(
                "frame header length {} is less than the minimum {}",
                self.header_length,
                VcduHeader::LEN
            )));
        }
        if self.frame_length < self.header_length + CcsdsHeader::LEN {
            return Err(Error::Config(format!(
                "frame length {} cannot hold a {} byte header and a packet header",
                self.frame_length, self.header_length
            )));
        }
        Ok(())
    }
}

/// Calculate the number of missing frame counts.
///
/// `cur` is the current frame counter. `last` is the frame counter seen before `cur`.
/// `cur` will be greater than `last` except in the case of a wrap.
#[must_use]
pub fn missing_frames(cur: u32, last: u32) -> u32 {
    cur.wrapping_sub(last).wrapping_sub(1) & VcduHeader::COUNTER_MAX
}
