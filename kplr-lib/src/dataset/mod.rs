//! Data set reconstruction.
//!
//! A data set is a run of consecutive packets sharing APID, packet id and timestamp.
//! The [Assembler] finds data set boundaries, tracks per-product sequence counters and
//! accounts for the storage each data set occupies, emitting one [SctEntry] per long
//! cadence or FFI data set.
mod assembler;
mod lookahead;
mod sct;

use std::fmt::Display;
use std::path::PathBuf;

use serde::Serialize;

use crate::framing::Vcid;
use crate::spacepacket::{Apid, PacketId, Statistics};

pub use assembler::{
    storage_units, Assembler, AssemblerState, HeaderStatus, Identity, Processed,
};
pub use lookahead::Lookahead;
pub use sct::{SctEntry, SctWriter};

/// Something unexpected, but not fatal, noticed in the stream. Downlinks routinely
/// contain gaps so these are reported and processing continues.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// A frame counter did not follow the previous counter for its virtual channel.
    VcduCounter {
        offset: u64,
        vcid: Vcid,
        expected: u32,
        actual: u32,
    },
    /// A first-header-pointer points past the end of the frame payload.
    FirstHeaderPointer {
        offset: u64,
        pointer: u16,
        payload_length: usize,
    },
    /// A packet sequence count skipped, i.e., dropped packet(s).
    DroppedPacket {
        offset: u64,
        apid: Apid,
        packet_id: PacketId,
        expected: u16,
        actual: u16,
    },
    /// A data set's pixel count differs from the first data set of the same type.
    PixelCount {
        offset: u64,
        apid: Apid,
        packet_id: PacketId,
        expected: u64,
        actual: u64,
    },
}

impl Anomaly {
    /// Absolute offset in the input of the frame or header the anomaly was found at.
    #[must_use]
    pub fn offset(&self) -> u64 {
        match self {
            Self::VcduCounter { offset, .. }
            | Self::FirstHeaderPointer { offset, .. }
            | Self::DroppedPacket { offset, .. }
            | Self::PixelCount { offset, .. } => *offset,
        }
    }
}

impl Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VcduCounter {
                offset,
                vcid,
                expected,
                actual,
            } => write!(
                f,
                "byte {offset}: vcid {vcid} counter not incrementing correctly; expected {expected}, got {actual}"
            ),
            Self::FirstHeaderPointer {
                offset,
                pointer,
                payload_length,
            } => write!(
                f,
                "byte {offset}: first header pointer {pointer} beyond payload length {payload_length}"
            ),
            Self::DroppedPacket {
                offset,
                apid,
                packet_id,
                expected,
                actual,
            } => write!(
                f,
                "byte {offset}: dropped packet? apid {apid} packet id {packet_id} expected sequence count {expected}, got {actual}"
            ),
            Self::PixelCount {
                offset,
                apid,
                packet_id,
                expected,
                actual,
            } => write!(
                f,
                "byte {offset}: apid {apid} packet id {packet_id} data set has {actual} pixels, expected {expected}"
            ),
        }
    }
}

/// Result of processing one stream.
#[derive(Serialize, Debug, Default, Clone)]
pub struct Report {
    /// Headers processed, fill and invalid headers included.
    pub packets: u64,
    pub fill_packets: u64,
    pub invalid_packets: u64,
    pub data_sets: u64,
    pub sct_entries: Vec<SctEntry>,
    /// All anomalies in stream order.
    pub anomalies: Vec<Anomaly>,
    pub statistics: Statistics,
    /// Timestamp of the first header, the session epoch.
    pub first_time: Option<f64>,
    pub last_time: Option<f64>,
    /// DMC files written, if repackaging.
    pub dmc_files: Vec<PathBuf>,
}
