use std::collections::HashMap;
use std::io::{Read, Seek};

use tracing::{debug, trace, warn};

use super::{missing_frames, FrameGeometry, HeaderLocator, VcduHeader, Vcid};
use crate::dataset::Anomaly;
use crate::source::{HeaderSource, LocatedHeader};
use crate::Result;

/// Walks a file of VCDUs producing each packet header embedded in the frame payloads.
///
/// For every frame with a first-header-pointer the headers are located by starting at
/// the pointer and advancing by each header's packet length while the candidate offset
/// is still inside the frame. A candidate landing exactly on the frame end is left for
/// the next frame, whose pointer reports it.
///
/// Frames are skipped, not decoded, when:
///
/// 1. They are fill frames (fill VCID or [VcduHeader::FILL_DATA] pointer)
/// 2. They contain only continuation data ([VcduHeader::NO_CCSDS_HEADER])
/// 3. Their first-header-pointer is beyond the payload, which is also reported as an
///    [Anomaly]
///
/// Frame counter jumps are reported as anomalies and otherwise ignored.
pub struct FramedHeaders<R>
where
    R: Read + Seek,
{
    locator: HeaderLocator<R>,
    geometry: FrameGeometry,
    frame_index: u64,
    // Frame relative offset of the next header in the current frame, or None when the
    // next frame must be read.
    candidate: Option<usize>,
    counters: HashMap<Vcid, u32>,
    anomalies: Vec<Anomaly>,
    done: bool,
}

impl<R> FramedHeaders<R>
where
    R: Read + Seek,
{
    /// # Errors
    /// [Error::Config](crate::Error::Config) if `geometry` cannot hold a VCDU header
    /// and a packet header.
    pub fn new(reader: R, geometry: FrameGeometry) -> Result<Self> {
        geometry.validate()?;
        Ok(FramedHeaders {
            locator: HeaderLocator::new(reader, geometry),
            geometry,
            frame_index: 0,
            candidate: None,
            counters: HashMap::default(),
            anomalies: Vec::default(),
            done: false,
        })
    }

    fn check_counter(&mut self, vcdu: &VcduHeader, frame_start: u64) {
        if let Some(last) = self.counters.insert(vcdu.vcid, vcdu.counter) {
            let missing = missing_frames(vcdu.counter, last);
            if missing > 0 {
                let expected = (last + 1) & VcduHeader::COUNTER_MAX;
                warn!(
                    offset = frame_start,
                    vcid = vcdu.vcid,
                    expected,
                    actual = vcdu.counter,
                    missing,
                    "VCDU counter not incrementing correctly"
                );
                self.anomalies.push(Anomaly::VcduCounter {
                    offset: frame_start,
                    vcid: vcdu.vcid,
                    expected,
                    actual: vcdu.counter,
                });
            }
        }
    }

    /// Advance to the next frame containing a packet header, setting the candidate.
    /// Returns false at the end of the stream.
    fn next_frame(&mut self) -> Result<bool> {
        loop {
            let frame_start = self.geometry.frame_start(self.frame_index);
            let Some(vcdu) = self.locator.read_frame_header(frame_start)? else {
                trace!(frame = self.frame_index, "no more frames");
                return Ok(false);
            };
            self.check_counter(&vcdu, frame_start);

            if vcdu.is_fill() {
                debug!(frame = self.frame_index, vcid = vcdu.vcid, "fill frame, skipping");
                self.frame_index += 1;
                continue;
            }
            if !vcdu.has_header() {
                trace!(frame = self.frame_index, "continuation frame, skipping");
                self.frame_index += 1;
                continue;
            }
            let payload_length = self.geometry.payload_length();
            if vcdu.header_offset() > payload_length {
                warn!(
                    frame = self.frame_index,
                    pointer = vcdu.first_header_pointer,
                    payload_length,
                    "first header pointer beyond payload, skipping frame"
                );
                self.anomalies.push(Anomaly::FirstHeaderPointer {
                    offset: frame_start,
                    pointer: vcdu.first_header_pointer,
                    payload_length,
                });
                self.frame_index += 1;
                continue;
            }

            self.candidate = Some(self.geometry.header_length + vcdu.header_offset());
            return Ok(true);
        }
    }
}

impl<R> Iterator for FramedHeaders<R>
where
    R: Read + Seek,
{
    type Item = Result<LocatedHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(candidate) = self.candidate {
                if candidate < self.geometry.frame_length {
                    let frame_start = self.geometry.frame_start(self.frame_index);
                    return match self.locator.locate_next(frame_start, candidate) {
                        Ok(Some(header)) => {
                            self.candidate = Some(candidate + header.packet_length());
                            Some(Ok(LocatedHeader {
                                header,
                                offset: frame_start + candidate as u64,
                                frame: Some(self.frame_index),
                            }))
                        }
                        Ok(None) => {
                            trace!(frame = self.frame_index, candidate, "stream ends in header");
                            self.done = true;
                            None
                        }
                        Err(err) => {
                            self.done = true;
                            Some(Err(err.into()))
                        }
                    };
                }
                // Done with this frame
                self.candidate = None;
                self.frame_index += 1;
            }

            match self.next_frame() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<R> HeaderSource for FramedHeaders<R>
where
    R: Read + Seek,
{
    fn read_packet(&mut self, located: &LocatedHeader) -> Result<Option<Vec<u8>>> {
        Ok(self
            .locator
            .read_packet(located.offset, located.header.packet_length())?)
    }

    fn take_anomalies(&mut self) -> Vec<Anomaly> {
        std::mem::take(&mut self.anomalies)
    }
}
