use crate::spacepacket::ValidationError;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A header failed validation while processing was configured to stop on errors.
    #[error("invalid header at byte {offset} (packet {packet}): {source}")]
    InvalidHeader {
        /// Absolute byte offset of the header in the input
        offset: u64,
        /// Zero-based index of the header in the stream
        packet: u64,
        #[source]
        source: ValidationError,
    },

    /// Header seconds could not be converted to a calendar time.
    #[error("timestamp out of range: {0} seconds")]
    Timestamp(u32),

    #[error("Invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
