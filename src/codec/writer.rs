//! Bounds-checked cursor over a caller-provided output buffer.

use crate::error::{ParseContext, RohcBuildingError};

#[derive(Debug)]
pub struct PacketWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    context: ParseContext,
}

impl<'a> PacketWriter<'a> {
    /// Creates a writer reporting overflows against `context`.
    pub fn new(buf: &'a mut [u8], context: ParseContext) -> Self {
        Self {
            buf,
            pos: 0,
            context,
        }
    }

    fn reserve(&mut self, len: usize) -> Result<&mut [u8], RohcBuildingError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(RohcBuildingError::BufferTooSmall {
                needed: end,
                available: self.buf.len(),
                context: self.context,
            });
        }
        let slot = &mut self.buf[self.pos..end];
        self.pos = end;
        Ok(slot)
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), RohcBuildingError> {
        self.reserve(1)?[0] = value;
        Ok(())
    }

    pub fn put_slice(&mut self, data: &[u8]) -> Result<(), RohcBuildingError> {
        self.reserve(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Hands the unwritten tail to `write`, which returns how many bytes it used.
    pub fn put_with<F>(&mut self, write: F) -> Result<(), RohcBuildingError>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, RohcBuildingError>,
    {
        let used = write(&mut self.buf[self.pos..])?;
        self.pos += used;
        Ok(())
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Written bytes.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}
