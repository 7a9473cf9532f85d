use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{Anomaly, Report, SctEntry};
use crate::source::LocatedHeader;
use crate::spacepacket::{
    Apid, CcsdsHeader, PacketId, Product, Statistics, ValidationError, FFI_CADENCE, LONG_CADENCE,
};
use crate::{Error, Result};

/// Storage units occupied by a packet.
///
/// Packets are stored in 16 byte blocks with 4 bytes of per-packet framing, computed
/// from the header's packet data length field.
#[must_use]
pub fn storage_units(header: &CcsdsHeader) -> u64 {
    (u64::from(header.data_length) + 4).div_ceil(16)
}

/// What identifies the data set a header belongs to.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub apid: Apid,
    pub packet_id: PacketId,
    pub timestamp: u64,
}

impl From<&CcsdsHeader> for Identity {
    fn from(header: &CcsdsHeader) -> Self {
        Identity {
            apid: header.apid,
            packet_id: header.packet_id,
            timestamp: header.timestamp,
        }
    }
}

/// Mutable state for one stream. A fresh state is used for every stream.
///
/// Sequence counters and the storage offset persist across data set boundaries; only
/// the identity fields change when a new data set begins.
#[derive(Serialize, Debug, Clone)]
pub struct AssemblerState {
    /// Identity of the data set currently accumulating storage.
    pub current: Option<Identity>,
    /// Storage offset where the current data set started.
    pub data_set_offset: u64,
    /// Last sequence count for each sequenced product.
    pub sequence: HashMap<Product, u16>,
    pub sct_offset: u64,
    pub sct_length: u64,
    pub sct_entry_count: u64,
    /// True when the next header processed starts a new data set.
    pub at_data_set_start: bool,
}

impl Default for AssemblerState {
    fn default() -> Self {
        Self {
            current: None,
            data_set_offset: 0,
            sequence: HashMap::default(),
            sct_offset: 0,
            sct_length: 0,
            sct_entry_count: 0,
            at_data_set_start: true,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HeaderStatus {
    Valid,
    /// First header byte is the fill byte; not validated.
    Fill,
    Invalid { error: ValidationError },
}

/// The outcome of processing one header.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processed {
    pub index: u64,
    pub status: HeaderStatus,
    pub at_data_set_start: bool,
    pub at_data_set_end: bool,
    /// Entry completed by the change of data set at this header.
    pub sct_entry: Option<SctEntry>,
}

/// The data set state machine.
///
/// Each header is processed together with the header that follows it so the end of a
/// data set is known at its last member:
///
/// 1. update the sequence counter of the header's product, reporting skipped counts
/// 2. on a change of data set identity, complete the storage correlation entry for the
///    previous data set if it was long cadence or FFI
/// 3. advance the storage offset and length
/// 4. check for fill, otherwise validate
/// 5. update statistics
///
/// A data set ends when the next header's timestamp, APID or packet id differs, or
/// there is no next header.
pub struct Assembler {
    stop_on_error: bool,
    state: AssemblerState,
    stats: Statistics,
    anomalies: Vec<Anomaly>,
    entries: Vec<SctEntry>,
    packets: u64,
    fill_packets: u64,
    invalid_packets: u64,
    data_sets: u64,
    first_time: Option<f64>,
    last_time: Option<f64>,
    // pixels in the data set in progress, and the first pixel count per data set type
    pixels: u64,
    expected_pixels: HashMap<(Apid, PacketId), u64>,
}

impl Assembler {
    #[must_use]
    pub fn new(stop_on_error: bool) -> Self {
        Assembler {
            stop_on_error,
            state: AssemblerState::default(),
            stats: Statistics::default(),
            anomalies: Vec::default(),
            entries: Vec::default(),
            packets: 0,
            fill_packets: 0,
            invalid_packets: 0,
            data_sets: 0,
            first_time: None,
            last_time: None,
            pixels: 0,
            expected_pixels: HashMap::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &AssemblerState {
        &self.state
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    #[must_use]
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Entries completed so far, including one completed by a header that then failed
    /// validation.
    #[must_use]
    pub fn sct_entries(&self) -> &[SctEntry] {
        &self.entries
    }

    /// Process `current`, using `next` to determine whether `current` ends its data set.
    /// `next` must be `None` only for the last header of the stream.
    ///
    /// # Errors
    /// [Error::InvalidHeader] if `current` fails validation and the assembler was created
    /// to stop on errors. Any entry completed by `current` is still available from
    /// [Assembler::sct_entries].
    pub fn process(
        &mut self,
        current: &LocatedHeader,
        next: Option<&LocatedHeader>,
    ) -> Result<Processed> {
        let header = &current.header;
        let index = self.packets;
        self.packets += 1;

        let time = header.timestamp_float();
        let first_time = *self.first_time.get_or_insert(time);
        self.last_time = Some(time);
        trace!(
            packet = index,
            offset = current.offset,
            relative_time = time - first_time,
            "{header}"
        );

        self.track_sequence(current);
        let sct_entry = self.track_identity(header);

        let units = storage_units(header);
        self.state.sct_offset += units;
        self.state.sct_length += units;

        let status = if header.is_fill() {
            debug!(packet = index, offset = current.offset, "fill packet");
            self.fill_packets += 1;
            HeaderStatus::Fill
        } else {
            match header.validate() {
                Ok(()) => HeaderStatus::Valid,
                Err(error) => {
                    warn!(
                        packet = index,
                        offset = current.offset,
                        field = error.field(),
                        raw = ?header.raw,
                        "invalid header: {error}"
                    );
                    self.invalid_packets += 1;
                    if self.stop_on_error {
                        return Err(Error::InvalidHeader {
                            offset: current.offset,
                            packet: index,
                            source: error,
                        });
                    }
                    HeaderStatus::Invalid { error }
                }
            }
        };

        self.stats.count_packet(header);
        if let Some(size) = header.product().and_then(|p| p.bytes_per_pixel()) {
            let data = header.packet_length().saturating_sub(CcsdsHeader::LEN);
            self.pixels += (data / size) as u64;
        }

        let at_data_set_start = self.state.at_data_set_start;
        let at_data_set_end = match next {
            Some(next) => {
                header.timestamp_changed(&next.header) || header.packet_type_changed(&next.header)
            }
            None => true,
        };
        if at_data_set_end {
            self.end_data_set(current);
        }
        self.state.at_data_set_start = at_data_set_end;

        Ok(Processed {
            index,
            status,
            at_data_set_start,
            at_data_set_end,
            sct_entry,
        })
    }

    fn track_sequence(&mut self, current: &LocatedHeader) {
        let header = &current.header;
        let Some(product) = header.product().filter(Product::is_sequenced) else {
            return;
        };
        let Some(last) = self.state.sequence.insert(product, header.sequence_count) else {
            return;
        };
        // a count at the wrap boundary is never flagged
        if last >= CcsdsHeader::SEQ_MAX {
            return;
        }
        let expected = last + 1;
        if header.sequence_count != expected {
            warn!(
                offset = current.offset,
                apid = header.apid,
                packet_id = header.packet_id,
                expected,
                actual = header.sequence_count,
                "dropped packet?"
            );
            self.anomalies.push(Anomaly::DroppedPacket {
                offset: current.offset,
                apid: header.apid,
                packet_id: header.packet_id,
                expected,
                actual: header.sequence_count,
            });
        }
    }

    fn track_identity(&mut self, header: &CcsdsHeader) -> Option<SctEntry> {
        let identity = Identity::from(header);
        if self.state.current == Some(identity) {
            return None;
        }
        let entry = self.state.current.and_then(|previous| self.complete_entry(previous));
        self.state.current = Some(identity);
        self.state.data_set_offset = self.state.sct_offset;
        self.state.sct_length = 0;
        entry
    }

    // Only long cadence and FFI data sets are recorded.
    fn complete_entry(&mut self, identity: Identity) -> Option<SctEntry> {
        if !matches!(identity.apid, LONG_CADENCE | FFI_CADENCE) {
            return None;
        }
        let entry = SctEntry {
            index: self.state.sct_entry_count,
            apid: identity.apid,
            packet_id: identity.packet_id,
            offset: self.state.data_set_offset,
            length: self.state.sct_length,
        };
        self.state.sct_entry_count += 1;
        self.entries.push(entry);
        debug!(%entry, "sct entry");
        Some(entry)
    }

    fn end_data_set(&mut self, last: &LocatedHeader) {
        let header = &last.header;
        self.data_sets += 1;

        if header
            .product()
            .and_then(|p| p.bytes_per_pixel())
            .is_some()
        {
            let key = (header.apid, header.packet_id);
            match self.expected_pixels.get(&key) {
                None => {
                    self.expected_pixels.insert(key, self.pixels);
                }
                Some(&expected) if expected != self.pixels => {
                    warn!(
                        offset = last.offset,
                        apid = header.apid,
                        packet_id = header.packet_id,
                        expected,
                        actual = self.pixels,
                        "pixel count mismatch"
                    );
                    self.anomalies.push(Anomaly::PixelCount {
                        offset: last.offset,
                        apid: header.apid,
                        packet_id: header.packet_id,
                        expected,
                        actual: self.pixels,
                    });
                }
                Some(_) => {}
            }
        }
        self.pixels = 0;

        self.stats.count_data_set(header);
    }

    /// Finish the stream, completing the entry for the final data set if needed.
    #[must_use]
    pub fn finish(mut self) -> (Option<SctEntry>, Report) {
        let entry = self
            .state
            .current
            .take()
            .and_then(|identity| self.complete_entry(identity));

        let report = Report {
            packets: self.packets,
            fill_packets: self.fill_packets,
            invalid_packets: self.invalid_packets,
            data_sets: self.data_sets,
            sct_entries: self.entries,
            anomalies: self.anomalies,
            statistics: self.stats,
            first_time: self.first_time,
            last_time: self.last_time,
            dmc_files: Vec::default(),
        };
        (entry, report)
    }
}
