use std::fmt::Display;
use std::io::{self, Write};

use serde::Serialize;

use crate::spacepacket::{Apid, PacketId};

/// One storage correlation table row: where a data set lives in storage.
///
/// `offset` and `length` are in storage units, see
/// [storage_units](super::storage_units).
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SctEntry {
    pub index: u64,
    pub apid: Apid,
    pub packet_id: PacketId,
    pub offset: u64,
    pub length: u64,
}

impl Display for SctEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "entry {}: {}, {}, {}, {}",
            self.index, self.apid, self.packet_id, self.offset, self.length
        )
    }
}

/// Appends [SctEntry]s to a text table, one line per entry.
pub struct SctWriter<W>
where
    W: Write,
{
    writer: W,
    count: u64,
}

impl<W> SctWriter<W>
where
    W: Write,
{
    pub fn new(writer: W) -> Self {
        SctWriter { writer, count: 0 }
    }

    /// Write `entry`. Entries must be appended in index order.
    ///
    /// # Errors
    /// Any ``std::io::Error`` writing
    pub fn append(&mut self, entry: &SctEntry) -> io::Result<()> {
        debug_assert_eq!(entry.index, self.count, "sct entries out of order");
        writeln!(self.writer, "{entry}")?;
        self.count += 1;
        Ok(())
    }

    /// Number of entries written.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flush and return the underlying writer.
    ///
    /// # Errors
    /// Any ``std::io::Error`` flushing
    pub fn into_inner(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
