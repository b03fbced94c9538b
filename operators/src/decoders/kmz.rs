use std::fs::File;
use std::io::Read;

use geoingest_datatypes::primitives::Feature;
use ouroboros::self_referencing;
use zip::ZipArchive;
use zip::result::ZipError;

use super::kml::KmlDecoder;
use crate::config::PipelineConfig;
use crate::error::Error;
use crate::scratch::ScratchStore;
use crate::util::Result;

/// A KML decoder over one entry of an opened archive
#[self_referencing]
struct EntryDecoder {
    archive: ZipArchive<File>,
    #[borrows(mut archive)]
    #[not_covariant]
    decoder: KmlDecoder<Box<dyn Read + 'this>>,
}

impl EntryDecoder {
    fn open(archive: ZipArchive<File>, index: usize) -> Result<Self> {
        EntryDecoderTryBuilder {
            archive,
            decoder_builder: |archive| {
                archive
                    .by_index(index)
                    .map(|entry| {
                        let reader: Box<dyn Read + '_> = Box::new(entry);
                        KmlDecoder::new(reader)
                    })
                    .map_err(Error::from)
            },
        }
        .try_build()
    }
}

/// Reads an entry to its end, which inflates it completely and checks its CRC
fn verify_entry(archive: &mut ZipArchive<File>, index: usize) -> Result<()> {
    let mut entry = archive.by_index(index)?;
    std::io::copy(&mut entry, &mut std::io::sink()).map_err(ZipError::from)?;
    Ok(())
}

enum KmzState {
    Buffering(Box<dyn Read>),
    Opening(ScratchStore),
    Draining {
        archive: ZipArchive<File>,
        next: usize,
    },
    StreamingEntry {
        index: usize,
        entry: EntryDecoder,
    },
    Done,
    Failed,
}

/// Decodes every `.kml` entry of a KMZ archive, in archive directory order.
///
/// Archives need random access, so a byte source is buffered to a scratch file
/// completely before the first entry is opened.
pub struct KmzDecoder {
    state: KmzState,
    config: PipelineConfig,
    /// keeps the buffered archive alive while entries are read from it
    store: Option<ScratchStore>,
}

impl KmzDecoder {
    pub fn new(reader: Box<dyn Read>, config: &PipelineConfig) -> Self {
        Self {
            state: KmzState::Buffering(reader),
            config: config.clone(),
            store: None,
        }
    }

    /// Starts from an archive that is already buffered
    pub fn from_scratch(store: ScratchStore, config: &PipelineConfig) -> Self {
        Self {
            state: KmzState::Opening(store),
            config: config.clone(),
            store: None,
        }
    }

    fn advance(&mut self, state: KmzState) -> Result<(KmzState, Option<Feature>)> {
        match state {
            KmzState::Buffering(mut reader) => {
                let mut store = ScratchStore::new(&self.config)?;
                std::io::copy(&mut reader, store.writer()?)?;
                store.seal()?;

                tracing::debug!("Buffered kmz archive of {} bytes", store.byte_len()?);

                Ok((KmzState::Opening(store), None))
            }
            KmzState::Opening(store) => {
                let archive = ZipArchive::new(store.open()?)?;
                self.store = Some(store);

                tracing::debug!("Opened kmz archive with {} entries", archive.len());

                Ok((KmzState::Draining { archive, next: 0 }, None))
            }
            KmzState::Draining { archive, next } => {
                let Some(index) = (next..archive.len()).find(|&i| {
                    archive
                        .name_for_index(i)
                        .is_some_and(|name| name.to_ascii_lowercase().ends_with(".kml"))
                }) else {
                    return Ok((KmzState::Done, None));
                };

                tracing::info!(
                    "Extracting kml {} from kmz archive",
                    archive.name_for_index(index).unwrap_or_default()
                );

                let entry = EntryDecoder::open(archive, index)?;

                Ok((KmzState::StreamingEntry { index, entry }, None))
            }
            KmzState::StreamingEntry { index, mut entry } => {
                match entry.with_decoder_mut(|decoder| decoder.next()) {
                    Some(Ok(feature)) => {
                        Ok((KmzState::StreamingEntry { index, entry }, Some(feature)))
                    }
                    Some(Err(error)) => {
                        // garbled entry data shows up as a kml error, the checksum tells them apart
                        let mut archive = entry.into_heads().archive;
                        Err(verify_entry(&mut archive, index).err().unwrap_or(error))
                    }
                    None => {
                        let archive = entry.into_heads().archive;
                        Ok((
                            KmzState::Draining {
                                archive,
                                next: index + 1,
                            },
                            None,
                        ))
                    }
                }
            }
            KmzState::Done => Ok((KmzState::Done, None)),
            KmzState::Failed => Ok((KmzState::Failed, None)),
        }
    }
}

impl Iterator for KmzDecoder {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, KmzState::Failed) {
                KmzState::Done => {
                    self.state = KmzState::Done;
                    return None;
                }
                KmzState::Failed => return None,
                state => match self.advance(state) {
                    Ok((state, feature)) => {
                        self.state = state;
                        if let Some(feature) = feature {
                            return Some(Ok(feature));
                        }
                    }
                    Err(error) => {
                        tracing::debug!("Kmz decoding failed: {error}");
                        return Some(Err(error));
                    }
                },
            }
        }
    }
}
