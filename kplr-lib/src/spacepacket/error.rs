use serde::Serialize;

use super::Apid;

/// Reason a [CcsdsHeader](super::CcsdsHeader) failed validation.
///
/// Each variant names the offending field along with the value found and the value,
/// or range of values, that was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("versionNumber is {actual}, expected 0")]
    Version { actual: u8 },

    #[error("type is {actual}, expected 0 (telemetry)")]
    Type { actual: u8 },

    #[error("sequenceFlags is {actual}, expected 3 (unsegmented)")]
    SequenceFlags { actual: u8 },

    #[error("applicationProcessId is {actual}, expected one of 40, 41, 42 or 2047")]
    Apid { actual: Apid },

    #[error("packetId is {actual}, expected 100-104, 106-120, 122-124 or 0x5a")]
    PacketId { actual: u8 },

    #[error("packet length is {actual}, expected at most {maximum}")]
    PacketLength { actual: usize, maximum: usize },
}

impl ValidationError {
    /// Name of the header field that failed validation.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::Version { .. } => "versionNumber",
            Self::Type { .. } => "type",
            Self::SequenceFlags { .. } => "sequenceFlags",
            Self::Apid { .. } => "applicationProcessId",
            Self::PacketId { .. } => "packetId",
            Self::PacketLength { .. } => "packetLength",
        }
    }
}
