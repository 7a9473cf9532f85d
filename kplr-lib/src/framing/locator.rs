use std::io::{self, Read, Seek};

use tracing::trace;

use super::{FrameGeometry, VcduHeader};
use crate::bytes::Bytes;
use crate::spacepacket::CcsdsHeader;

/// Reads VCDU headers and the packet headers embedded in VCDU payloads.
///
/// Offsets passed to [HeaderLocator::locate_next] are relative to the start of a frame
/// and include the VCDU header bytes. Packet header bytes are never assumed to be
/// contiguous in the file: a header that starts within the last
/// [CcsdsHeader::LEN] - 1 bytes of a frame is completed from the payload of the next
/// frame, skipping over that frame's VCDU header.
pub struct HeaderLocator<R>
where
    R: Read + Seek,
{
    bytes: Bytes<R>,
    geometry: FrameGeometry,
}

impl<R> HeaderLocator<R>
where
    R: Read + Seek,
{
    pub fn new(reader: R, geometry: FrameGeometry) -> Self {
        HeaderLocator {
            bytes: Bytes::new(reader),
            geometry,
        }
    }

    #[must_use]
    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Read the VCDU header of the frame starting at `frame_start`, or `None` at the end
    /// of the stream.
    ///
    /// # Errors
    /// Any non-EOF IO error
    pub fn read_frame_header(&mut self, frame_start: u64) -> io::Result<Option<VcduHeader>> {
        let mut buf = vec![0u8; self.geometry.header_length];
        if !self.bytes.fill_at(frame_start, &mut buf)? {
            return Ok(None);
        }
        Ok(VcduHeader::decode(&buf))
    }

    /// Read and decode the packet header at `candidate` bytes into the frame starting at
    /// `frame_start`. `candidate` must be less than the frame length.
    ///
    /// Returns `None` if the stream ends before all header bytes were read.
    ///
    /// # Errors
    /// Any non-EOF IO error
    pub fn locate_next(
        &mut self,
        frame_start: u64,
        candidate: usize,
    ) -> io::Result<Option<CcsdsHeader>> {
        let frame_length = self.geometry.frame_length;
        debug_assert!(candidate < frame_length, "candidate outside of frame");

        let mut buf = [0u8; CcsdsHeader::LEN];
        if candidate + CcsdsHeader::LEN <= frame_length {
            if !self.bytes.fill_at(frame_start + candidate as u64, &mut buf)? {
                return Ok(None);
            }
        } else {
            // Header straddles into the next frame; head is in this frame, the tail is at
            // the start of the next frame's payload.
            let available = frame_length - candidate;
            let (head, tail) = buf.split_at_mut(available);
            if !self.bytes.fill_at(frame_start + candidate as u64, head)? {
                return Ok(None);
            }
            let next_payload =
                frame_start + frame_length as u64 + self.geometry.header_length as u64;
            if !self.bytes.fill_at(next_payload, tail)? {
                return Ok(None);
            }
            trace!(
                frame_start,
                candidate,
                head = available,
                tail = tail.len(),
                "header spans frames"
            );
        }

        Ok(Some(CcsdsHeader::decode(&buf)))
    }

    /// Read `len` bytes of packet data starting at absolute offset `start`, skipping the
    /// VCDU header of every frame crossed.
    ///
    /// Returns `None` if the stream ends first.
    ///
    /// # Errors
    /// Any non-EOF IO error
    pub fn read_packet(&mut self, start: u64, len: usize) -> io::Result<Option<Vec<u8>>> {
        let frame_length = self.geometry.frame_length as u64;
        let header_length = self.geometry.header_length as u64;

        let mut data = vec![0u8; len];
        let mut filled = 0;
        let mut pos = start;
        while filled < len {
            let frame_start = pos - pos % frame_length;
            if pos - frame_start < header_length {
                pos = frame_start + header_length;
            }
            let available = (frame_start + frame_length - pos) as usize;
            let n = available.min(len - filled);
            if !self.bytes.fill_at(pos, &mut data[filled..filled + n])? {
                return Ok(None);
            }
            filled += n;
            pos += n as u64;
        }

        Ok(Some(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacepacket::{HeaderFields, BASELINE, LONG_CADENCE};
    use std::io::Cursor;

    const GEOMETRY: FrameGeometry = FrameGeometry {
        frame_length: 40,
        header_length: 8,
    };

    fn header_bytes() -> [u8; CcsdsHeader::LEN] {
        HeaderFields::builder()
            .apid(LONG_CADENCE)
            .packet_id(BASELINE)
            .sequence_count(1234)
            .data_length(300)
            .seconds(0xdead_beef)
            .subseconds(17)
            .build()
            .encode()
    }

    #[test]
    fn locate_contiguous_header() {
        let mut dat = vec![0u8; 80];
        dat[20..34].copy_from_slice(&header_bytes());

        let mut locator = HeaderLocator::new(Cursor::new(dat), GEOMETRY);
        let header = locator.locate_next(0, 20).unwrap().unwrap();
        assert_eq!(header.raw, header_bytes());

        // exactly at the last position that fits
        let mut dat = vec![0u8; 80];
        dat[26..40].copy_from_slice(&header_bytes());
        let mut locator = HeaderLocator::new(Cursor::new(dat), GEOMETRY);
        let header = locator.locate_next(0, 26).unwrap().unwrap();
        assert_eq!(header.raw, header_bytes());
    }

    #[test]
    fn locate_header_split_across_frames() {
        let raw = header_bytes();
        let mut dat = vec![0xffu8; 80];
        // 6 bytes at the tail of frame 0, 8 bytes after the VCDU header of frame 1
        dat[34..40].copy_from_slice(&raw[..6]);
        dat[48..56].copy_from_slice(&raw[6..]);

        let mut locator = HeaderLocator::new(Cursor::new(dat), GEOMETRY);
        let split = locator.locate_next(0, 34).unwrap().unwrap();
        assert_eq!(split, CcsdsHeader::decode(&raw));
    }

    #[test]
    fn locate_short_read_is_none() {
        let raw = header_bytes();
        let mut dat = vec![0u8; 45];
        dat[34..40].copy_from_slice(&raw[..6]);

        let mut locator = HeaderLocator::new(Cursor::new(dat.clone()), GEOMETRY);
        assert!(locator.locate_next(0, 34).unwrap().is_none());

        let mut locator = HeaderLocator::new(Cursor::new(dat), GEOMETRY);
        assert!(locator.locate_next(40, 0).unwrap().is_none());
    }

    #[test]
    fn read_packet_skips_frame_headers() {
        let mut dat = Vec::new();
        for frame in 0..3u8 {
            dat.extend_from_slice(&[0xaa; 8]);
            dat.extend((0..32u8).map(|b| frame * 32 + b));
        }
        let mut locator = HeaderLocator::new(Cursor::new(dat), GEOMETRY);

        let packet = locator.read_packet(30, 50).unwrap().unwrap();
        let expected: Vec<u8> = (22..72).collect();
        assert_eq!(packet, expected);

        assert!(locator.read_packet(100, 50).unwrap().is_none());
    }
}
