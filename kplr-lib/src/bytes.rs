use std::io::{self, ErrorKind, Read, Seek, SeekFrom};

/// Bytes provides positioned reads from a seekable reader, i.e., read-exact-at.
///
/// Running out of data is not an error; it is reported as `Ok(false)` so callers can
/// treat it as the end of the stream. Seeks are only performed when the requested
/// offset is not the current position so sequential reads through a buffered reader
/// stay buffered.
pub struct Bytes<R>
where
    R: Read + Seek,
{
    reader: R,
    pos: u64,
}

impl<R> Bytes<R>
where
    R: Read + Seek,
{
    pub fn new(reader: R) -> Self {
        Bytes { reader, pos: 0 }
    }

    /// Fill `buf` with the bytes starting at absolute `offset`.
    ///
    /// Returns `Ok(false)` if there are not enough bytes left to fill `buf`; the content
    /// of `buf` is then unspecified.
    pub fn fill_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<bool, io::Error> {
        if buf.is_empty() {
            return Ok(true);
        }
        if offset != self.pos {
            self.pos = self.reader.seek(SeekFrom::Start(offset))?;
        }
        if let Err(err) = self.reader.read_exact(buf) {
            // position is unknown after a failed read_exact
            self.pos = self.reader.stream_position()?;
            if err.kind() == ErrorKind::UnexpectedEof {
                return Ok(false);
            }
            return Err(err);
        }
        self.pos += buf.len() as u64;
        Ok(true)
    }

    /// Current absolute position of the underlying reader.
    pub fn offset(&self) -> u64 {
        self.pos
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
