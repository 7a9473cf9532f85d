//! Repackaging of science data sets into DMC files.
//!
//! Each long or short cadence data set is written to its own file, every packet padded
//! with zeros to [CcsdsHeader::MAX_PACKET_LEN] bytes. Files are named for the nominal
//! time of the data set, e.g., `kplr2009123120000a.lcb`.
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::spacepacket::{CcsdsHeader, Product};
use crate::{Error, Result};

/// Seconds from the Unix epoch to 2000-01-01T12:00:00Z, the spacecraft clock epoch.
pub const CLOCK_EPOCH: i64 = 946_728_000;

/// Nominal time of a header's seconds field.
///
/// # Errors
/// [Error::Timestamp] if the time is not representable.
pub fn nominal_time(header: &CcsdsHeader) -> Result<DateTime<Utc>> {
    let seconds = header.timestamp_seconds();
    Utc.timestamp_opt(CLOCK_EPOCH + i64::from(seconds), 0)
        .single()
        .ok_or(Error::Timestamp(seconds))
}

/// DMC file name for a data set of `product` at `time`, if the product is repackaged.
#[must_use]
pub fn file_name(product: Product, time: &DateTime<Utc>) -> Option<String> {
    let ext = product.extension()?;
    Some(format!("kplr{}a.{ext}", time.format("%Y%j%H%M%S")))
}

// Each short cadence baseline data set is a new minute; every other product shares the
// time of the data set before it.
fn advance(product: Product) -> Duration {
    match product {
        Product::ShortCadenceBaseline => Duration::minutes(1),
        _ => Duration::zero(),
    }
}

/// Writes packets to per-data-set DMC files.
///
/// A data set whose product has no DMC extension, e.g., FFI or raw data, is skipped.
pub struct DmcRepackager {
    dir: PathBuf,
    time: Option<DateTime<Utc>>,
    current: Option<BufWriter<File>>,
    created: HashSet<PathBuf>,
    files: Vec<PathBuf>,
}

impl DmcRepackager {
    /// Write files to `dir`. The first data set is named for its header time.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        DmcRepackager {
            dir: dir.as_ref().to_path_buf(),
            time: None,
            current: None,
            created: HashSet::default(),
            files: Vec::default(),
        }
    }

    /// Name the first data set for `start` rather than its header time.
    #[must_use]
    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.time = Some(start);
        self
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.current.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn open(&mut self, header: &CcsdsHeader) -> Result<()> {
        self.close()?;

        let Some(product) = header.product().filter(|p| p.extension().is_some()) else {
            debug!(
                apid = header.apid,
                packet_id = header.packet_id,
                "not repackaging data set"
            );
            return Ok(());
        };
        let time = match self.time {
            Some(last) => last + advance(product),
            None => nominal_time(header)?,
        };
        self.time = Some(time);

        let Some(name) = file_name(product, &time) else {
            return Ok(());
        };
        let path = self.dir.join(name);
        let file = if self.created.contains(&path) {
            warn!(?path, "DMC file already written this session, appending");
            OpenOptions::new().append(true).open(&path)?
        } else {
            info!(?path, "creating DMC file");
            let file = File::create(&path)?;
            self.created.insert(path.clone());
            self.files.push(path);
            file
        };
        self.current = Some(BufWriter::new(file));
        Ok(())
    }

    /// Write one packet. `at_data_set_start` must be true for the first packet of each
    /// data set, which closes the previous file and opens the next.
    ///
    /// # Errors
    /// On any IO error, or [Error::Timestamp] if the data set time cannot be
    /// represented.
    pub fn write_packet(
        &mut self,
        header: &CcsdsHeader,
        at_data_set_start: bool,
        packet: &[u8],
    ) -> Result<()> {
        if at_data_set_start {
            self.open(header)?;
        }
        let Some(writer) = self.current.as_mut() else {
            return Ok(());
        };

        let data = if packet.len() > CcsdsHeader::MAX_PACKET_LEN {
            warn!(
                len = packet.len(),
                "packet longer than {} bytes, truncating",
                CcsdsHeader::MAX_PACKET_LEN
            );
            &packet[..CcsdsHeader::MAX_PACKET_LEN]
        } else {
            packet
        };
        writer.write_all(data)?;
        let padding = (CcsdsHeader::MAX_PACKET_LEN - data.len()) as u64;
        io::copy(&mut io::repeat(0).take(padding), writer)?;
        Ok(())
    }

    /// Close any open file, returning the files created in creation order.
    ///
    /// # Errors
    /// On any IO error flushing the last file.
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        self.close()?;
        Ok(self.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacepacket::{
        Apid, HeaderFields, PacketId, BASELINE, FFI_CADENCE, LONG_CADENCE, SHORT_CADENCE,
    };

    fn packet(apid: Apid, packet_id: PacketId, seconds: u32) -> (CcsdsHeader, Vec<u8>) {
        let mut dat = HeaderFields::builder()
            .apid(apid)
            .packet_id(packet_id)
            .data_length(93)
            .seconds(seconds)
            .build()
            .encode()
            .to_vec();
        dat.resize(100, 0xab);
        (CcsdsHeader::from_slice(&dat).unwrap(), dat)
    }

    #[test]
    fn test_nominal_time() {
        let (header, _) = packet(LONG_CADENCE, BASELINE, 86400);
        let time = nominal_time(&header).unwrap();
        assert_eq!(time.to_rfc3339(), "2000-01-02T12:00:00+00:00");
        assert_eq!(
            file_name(Product::LongCadenceBaseline, &time).unwrap(),
            "kplr2000002120000a.lcb"
        );
        assert_eq!(file_name(Product::FullFrameImage, &time), None);
    }

    #[test]
    fn writes_padded_packets_per_data_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut dmc = DmcRepackager::new(dir.path());

        let (h1, p1) = packet(SHORT_CADENCE, BASELINE, 0);
        dmc.write_packet(&h1, true, &p1).unwrap();
        dmc.write_packet(&h1, false, &p1).unwrap();
        let (h2, p2) = packet(SHORT_CADENCE, BASELINE, 60);
        dmc.write_packet(&h2, true, &p2).unwrap();

        let files = dmc.finish().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["kplr2000001120000a.scb", "kplr2000001120100a.scb"]
        );

        let first = std::fs::read(&files[0]).unwrap();
        assert_eq!(first.len(), 2 * CcsdsHeader::MAX_PACKET_LEN);
        assert_eq!(&first[..100], &p1[..]);
        assert!(first[100..CcsdsHeader::MAX_PACKET_LEN].iter().all(|b| *b == 0));
    }

    #[test]
    fn skips_ffi_and_appends_to_existing() {
        let dir = tempfile::tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2009, 5, 3, 12, 0, 0).unwrap();
        let mut dmc = DmcRepackager::new(dir.path()).with_start(start);

        // long cadence does not advance the time so the second data set lands in the
        // same file as the first
        let (lc, p) = packet(LONG_CADENCE, BASELINE, 0);
        dmc.write_packet(&lc, true, &p).unwrap();
        let (ffi, pf) = packet(FFI_CADENCE, 110, 0);
        dmc.write_packet(&ffi, true, &pf).unwrap();
        dmc.write_packet(&lc, true, &p).unwrap();

        let files = dmc.finish().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("kplr2009123120000a.lcb"));
        let data = std::fs::read(&files[0]).unwrap();
        assert_eq!(data.len(), 2 * CcsdsHeader::MAX_PACKET_LEN);
    }
}
