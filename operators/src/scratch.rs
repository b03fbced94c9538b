//! Disk-backed buffers that make single-pass byte and row streams re-readable.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use futures::{Stream, StreamExt};
use tempfile::NamedTempFile;

use crate::config::PipelineConfig;
use crate::error::Error;
use crate::util::Result;

/// A temporary file that is written once and then read any number of times.
///
/// The file is removed when the store is dropped.
#[derive(Debug)]
pub struct ScratchStore {
    file: NamedTempFile,
    state: ScratchState,
}

#[derive(Debug)]
enum ScratchState {
    Writing(BufWriter<File>),
    Sealed,
}

impl ScratchStore {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&config.scratch_prefix);

        let file = match &config.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let writer = BufWriter::new(file.as_file().try_clone()?);

        tracing::debug!("Created scratch store {}", file.path().display());

        Ok(Self {
            file,
            state: ScratchState::Writing(writer),
        })
    }

    /// Buffers a byte stream completely and seals the store.
    pub async fn from_byte_stream<S, B, E>(mut stream: S, config: &PipelineConfig) -> Result<Self>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Into<Error>,
    {
        let mut store = Self::new(config)?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Into::<Error>::into)?;
            store.append(chunk.as_ref())?;
        }

        store.seal()?;

        Ok(store)
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer()?.write_all(bytes)?;
        Ok(())
    }

    /// The buffered writer of a store that is not sealed yet
    pub fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        match &mut self.state {
            ScratchState::Writing(writer) => Ok(writer),
            ScratchState::Sealed => Err(Error::ScratchStoreState {
                details: "cannot write to a sealed store".to_string(),
            }),
        }
    }

    /// Flushes all written data and turns the store read-only. Sealing twice is a no-op.
    pub fn seal(&mut self) -> Result<()> {
        if let ScratchState::Writing(writer) = &mut self.state {
            writer.flush()?;
            self.state = ScratchState::Sealed;
        }
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.state, ScratchState::Sealed)
    }

    pub fn byte_len(&self) -> Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }

    /// A fresh handle with its own cursor at the start of the data
    pub fn open(&self) -> Result<File> {
        if !self.is_sealed() {
            return Err(Error::ScratchStoreState {
                details: "cannot read from a store that is still being written".to_string(),
            });
        }

        Ok(self.file.reopen()?)
    }

    pub fn reader(&self) -> Result<BufReader<File>> {
        self.open().map(BufReader::new)
    }

    /// A reader that owns the store, so the file lives as long as it is read
    pub fn into_reader(self) -> Result<ScratchReader> {
        Ok(ScratchReader {
            reader: self.reader()?,
            _store: self,
        })
    }
}

#[derive(Debug)]
pub struct ScratchReader {
    reader: BufReader<File>,
    _store: ScratchStore,
}

impl Read for ScratchReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}
