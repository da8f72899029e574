//! Sinks that copy ingested chunks out to a stream.

use std::io;

use crate::{Error, Result};

/// Writes chunk data in the format of the reader that produced it.
///
/// `write` may be called any number of times, each writing the most recently
/// read unit; `complete` is called once afterwards to write any epilogue and
/// flush the stream.
pub trait ChunkWriter {
   fn write(&mut self, output: &mut dyn io::Write) -> Result<()>;

   fn complete(&mut self, output: &mut dyn io::Write) -> Result<()>;
}

/// Copies staged chunk bytes through unchanged.
#[derive(Debug, Default)]
pub struct CopyChunkWriter {
   current:   Vec<u8>,
   written:   u64,
   completed: bool,
}

impl CopyChunkWriter {
   pub fn new() -> Self {
      Self::default()
   }

   /// Makes `data` the unit emitted by the next [`ChunkWriter::write`].
   pub fn stage(&mut self, data: &[u8]) {
      self.current.clear();
      self.current.extend_from_slice(data);
   }

   /// Bytes written so far.
   pub const fn bytes_written(&self) -> u64 {
      self.written
   }
}

impl ChunkWriter for CopyChunkWriter {
   fn write(&mut self, output: &mut dyn io::Write) -> Result<()> {
      if self.completed {
         return Err(Error::WriterClosed);
      }
      output.write_all(&self.current)?;
      self.written += self.current.len() as u64;
      Ok(())
   }

   fn complete(&mut self, output: &mut dyn io::Write) -> Result<()> {
      if self.completed {
         return Err(Error::WriterClosed);
      }
      self.completed = true;
      output.flush()?;
      Ok(())
   }
}
