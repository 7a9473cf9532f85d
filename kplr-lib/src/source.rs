use std::io::{Read, Seek};

use serde::Serialize;
use tracing::trace;

use crate::bytes::Bytes;
use crate::dataset::Anomaly;
use crate::spacepacket::CcsdsHeader;
use crate::Result;

/// A decoded packet header and where it was found.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedHeader {
    pub header: CcsdsHeader,
    /// Absolute byte offset of the first header byte in the input.
    pub offset: u64,
    /// Index of the VCDU the header starts in, if the input is framed.
    pub frame: Option<u64>,
}

/// A lazy, finite, non-restartable sequence of packet headers read from a stream.
///
/// End of stream, including a short read part way through a header, ends the
/// iteration. Errors are only produced for real IO failures.
pub trait HeaderSource: Iterator<Item = Result<LocatedHeader>> {
    /// Read the complete packet, header included, for a header previously produced by
    /// this source. Returns `None` if the stream ends before the end of the packet.
    ///
    /// # Errors
    /// Any non-EOF IO error
    fn read_packet(&mut self, located: &LocatedHeader) -> Result<Option<Vec<u8>>>;

    /// Take any anomalies noticed while reading, e.g., frame counter jumps.
    fn take_anomalies(&mut self) -> Vec<Anomaly> {
        Vec::new()
    }
}

/// Headers from a stream of packets laid back to back with no framing.
pub struct PacketHeaders<R>
where
    R: Read + Seek,
{
    bytes: Bytes<R>,
    offset: u64,
    done: bool,
}

impl<R> PacketHeaders<R>
where
    R: Read + Seek,
{
    pub fn new(reader: R) -> Self {
        PacketHeaders {
            bytes: Bytes::new(reader),
            offset: 0,
            done: false,
        }
    }
}

impl<R> Iterator for PacketHeaders<R>
where
    R: Read + Seek,
{
    type Item = Result<LocatedHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = [0u8; CcsdsHeader::LEN];
        match self.bytes.fill_at(self.offset, &mut buf) {
            Ok(true) => {}
            Ok(false) => {
                trace!(offset = self.offset, "no more packets");
                self.done = true;
                return None;
            }
            Err(err) => {
                self.done = true;
                return Some(Err(err.into()));
            }
        }

        let header = CcsdsHeader::decode(&buf);
        let located = LocatedHeader {
            header,
            offset: self.offset,
            frame: None,
        };
        self.offset += header.packet_length() as u64;
        Some(Ok(located))
    }
}

impl<R> HeaderSource for PacketHeaders<R>
where
    R: Read + Seek,
{
    fn read_packet(&mut self, located: &LocatedHeader) -> Result<Option<Vec<u8>>> {
        let mut data = vec![0u8; located.header.packet_length()];
        if !self.bytes.fill_at(located.offset, &mut data)? {
            return Ok(None);
        }
        Ok(Some(data))
    }
}
