use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::dataset::{Assembler, Lookahead, Report, SctWriter};
use crate::dmc::DmcRepackager;
use crate::framing::{FrameGeometry, FramedHeaders};
use crate::source::{HeaderSource, PacketHeaders};
use crate::{Error, Result};

/// Layout of the input file.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Fixed length VCDUs carrying packets in their payloads.
    #[default]
    Vcdu,
    /// Packets back to back with no framing.
    Packets,
}

/// Options for reading one stream.
///
/// ```
/// use kplr::pipeline::{InputFormat, ReaderConfig};
///
/// let config = ReaderConfig::builder()
///     .stop_on_error(true)
///     .max_packets(10)
///     .build();
/// assert_eq!(config.format, InputFormat::Vcdu);
/// assert_eq!(config.max_packets, Some(10));
/// ```
#[derive(Serialize, Deserialize, TypedBuilder, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Return [Error::InvalidHeader] at the first header that fails validation.
    #[builder(default)]
    pub stop_on_error: bool,
    /// Stop after this many headers. The last one read is treated as the last in the
    /// stream.
    #[builder(default, setter(strip_option))]
    pub max_packets: Option<u64>,
    #[builder(default)]
    pub format: InputFormat,
    /// Frame layout; only used for [InputFormat::Vcdu].
    #[builder(default)]
    pub geometry: FrameGeometry,
}

impl ReaderConfig {
    /// Read a JSON config. Missing fields take their default values.
    ///
    /// # Errors
    /// [Error::Config] if the JSON cannot be decoded or the geometry is not usable.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let config: ReaderConfig =
            serde_json::from_reader(reader).map_err(|err| Error::Config(err.to_string()))?;
        config.geometry.validate()?;
        Ok(config)
    }
}

/// Drives headers from a [HeaderSource] through the [Assembler], writing storage
/// correlation entries and, optionally, DMC files.
pub struct Pipeline<W = io::Sink>
where
    W: Write,
{
    config: ReaderConfig,
    sct: SctWriter<W>,
    dmc: Option<DmcRepackager>,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: ReaderConfig) -> Self {
        Pipeline {
            config,
            sct: SctWriter::new(io::sink()),
            dmc: None,
        }
    }
}

impl<W> Pipeline<W>
where
    W: Write,
{
    /// Write SCT entries to `writer`.
    pub fn with_sct<X: Write>(self, writer: X) -> Pipeline<X> {
        Pipeline {
            config: self.config,
            sct: SctWriter::new(writer),
            dmc: self.dmc,
        }
    }

    #[must_use]
    pub fn with_dmc(mut self, dmc: DmcRepackager) -> Self {
        self.dmc = Some(dmc);
        self
    }

    /// Process every header in `source`.
    ///
    /// # Errors
    /// [Error::InvalidHeader] if configured to stop on errors, otherwise only IO errors
    /// reading the source or writing outputs.
    pub fn run<S: HeaderSource>(mut self, source: S) -> Result<Report> {
        let mut assembler = Assembler::new(self.config.stop_on_error);
        let mut headers = Lookahead::new(source);
        let mut count: u64 = 0;

        loop {
            if self.config.max_packets.is_some_and(|max| count >= max) {
                debug!(count, "packet limit reached");
                break;
            }
            let Some(zult) = headers.next() else {
                break;
            };
            let (current, mut next) = zult?;
            count += 1;
            if self.config.max_packets.is_some_and(|max| count >= max) {
                next = None;
            }

            let processed = match assembler.process(&current, next.as_ref()) {
                Ok(processed) => processed,
                Err(err) => {
                    // the data set this header completed is still recorded
                    let written = self.sct.count() as usize;
                    for entry in &assembler.sct_entries()[written..] {
                        self.sct.append(entry)?;
                    }
                    self.sct.into_inner()?;
                    return Err(err);
                }
            };
            if let Some(entry) = processed.sct_entry {
                self.sct.append(&entry)?;
            }

            if let Some(dmc) = self.dmc.as_mut() {
                match headers.get_mut().read_packet(&current)? {
                    Some(packet) => {
                        dmc.write_packet(&current.header, processed.at_data_set_start, &packet)?;
                    }
                    None => warn!(offset = current.offset, "stream ends inside packet"),
                }
            }
        }

        let source_anomalies = headers.get_mut().take_anomalies();
        let (last_entry, mut report) = assembler.finish();
        if let Some(entry) = last_entry {
            self.sct.append(&entry)?;
        }
        self.sct.into_inner()?;
        if let Some(dmc) = self.dmc {
            report.dmc_files = dmc.finish()?;
        }

        report.anomalies.extend(source_anomalies);
        report.anomalies.sort_by_key(crate::dataset::Anomaly::offset);

        info!(
            packets = report.packets,
            data_sets = report.data_sets,
            sct_entries = report.sct_entries.len(),
            anomalies = report.anomalies.len(),
            "done"
        );
        Ok(report)
    }

    /// Open `path` and process it according to the configured [InputFormat].
    ///
    /// # Errors
    /// See [Pipeline::run]; also [Error::Config] for an unusable frame geometry.
    pub fn run_file<P: AsRef<Path>>(self, path: P) -> Result<Report> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        debug!(path = ?path.as_ref(), format = ?self.config.format, "reading");
        match self.config.format {
            InputFormat::Vcdu => {
                let geometry = self.config.geometry;
                self.run(FramedHeaders::new(reader, geometry)?)
            }
            InputFormat::Packets => self.run(PacketHeaders::new(reader)),
        }
    }
}
