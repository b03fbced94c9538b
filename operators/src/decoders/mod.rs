//! Format specific decoders that turn uploaded files into a sequence of [`Feature`]s.

use std::io::Read;

use geoingest_datatypes::primitives::Feature;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::config::PipelineConfig;
use crate::error::Error;
use crate::scratch::ScratchStore;
use crate::util::Result;

mod geojson;
mod kml;
mod kmz;
mod stream;

pub use self::geojson::GeoJsonDecoder;
pub use self::kml::KmlDecoder;
pub use self::kmz::KmzDecoder;
pub use self::stream::decode_stream;

/// A pull based decoder: every call to `next` decodes exactly one more feature.
///
/// Decoders yield at most one error and end afterwards.
pub trait FeatureDecoder: Iterator<Item = Result<Feature>> {}

impl<T> FeatureDecoder for T where T: Iterator<Item = Result<Feature>> {}

/// The input of a decoder
pub enum DecoderInput {
    Reader(Box<dyn Read + Send>),
    /// an already parsed JSON document
    Json(Value),
    /// a sealed scratch store, e.g. an upload that was buffered before
    Scratch(ScratchStore),
}

impl DecoderInput {
    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }
}

impl std::fmt::Debug for DecoderInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderInput::Reader(_) => f.write_str("Reader"),
            DecoderInput::Json(_) => f.write_str("Json"),
            DecoderInput::Scratch(store) => f.debug_tuple("Scratch").field(store).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum DecoderKind {
    GeoJson,
    Kml,
    Kmz,
}

impl DecoderKind {
    pub fn content_types(self) -> &'static [&'static str] {
        match self {
            DecoderKind::GeoJson => &[
                "application/json",
                "application/geo+json",
                "application/vnd.geo+json",
            ],
            DecoderKind::Kml => &["application/vnd.google-earth.kml+xml"],
            DecoderKind::Kmz => &["application/vnd.google-earth.kmz"],
        }
    }

    /// Selects the decoder for a `Content-Type`, parameters like `charset` are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoingest_operators::decoders::DecoderKind;
    ///
    /// let kind = DecoderKind::for_content_type("Application/JSON; charset=utf-8").unwrap();
    /// assert_eq!(kind, DecoderKind::GeoJson);
    /// ```
    pub fn for_content_type(content_type: &str) -> Result<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        Self::iter()
            .find(|kind| kind.content_types().contains(&essence.as_str()))
            .ok_or_else(|| Error::UnsupportedContentType {
                content_type: content_type.to_string(),
            })
    }

    /// Whether the schema can be read without decoding the whole input
    pub fn can_summarize_quickly(self) -> bool {
        match self {
            DecoderKind::GeoJson | DecoderKind::Kml | DecoderKind::Kmz => false,
        }
    }

    /// Creates the decoder for `input`.
    ///
    /// KMZ decoders borrow from their archive and cannot move between threads,
    /// so this has to run on the thread that consumes the decoder.
    pub fn open(self, input: DecoderInput, config: &PipelineConfig) -> Result<Box<dyn FeatureDecoder>> {
        tracing::debug!("Opening {self} decoder for {input:?}");

        let decoder: Box<dyn FeatureDecoder> = match (self, input) {
            (DecoderKind::GeoJson, DecoderInput::Json(value)) => {
                Box::new(GeoJsonDecoder::from_value(value)?)
            }
            (DecoderKind::GeoJson, DecoderInput::Reader(reader)) => {
                Box::new(GeoJsonDecoder::from_reader(reader)?)
            }
            (DecoderKind::GeoJson, DecoderInput::Scratch(store)) => {
                Box::new(GeoJsonDecoder::from_reader(store.reader()?)?)
            }
            (DecoderKind::Kml, DecoderInput::Reader(reader)) => Box::new(KmlDecoder::new(reader)),
            (DecoderKind::Kml, DecoderInput::Scratch(store)) => {
                Box::new(KmlDecoder::new(store.into_reader()?))
            }
            (DecoderKind::Kmz, DecoderInput::Reader(reader)) => {
                Box::new(KmzDecoder::new(reader, config))
            }
            (DecoderKind::Kmz, DecoderInput::Scratch(store)) => {
                Box::new(KmzDecoder::from_scratch(store, config))
            }
            (kind @ (DecoderKind::Kml | DecoderKind::Kmz), DecoderInput::Json(_)) => {
                return Err(Error::parse(
                    format!("{kind} input cannot be a JSON document"),
                    None,
                ));
            }
        };

        Ok(decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(
            DecoderKind::for_content_type("application/geo+json").unwrap(),
            DecoderKind::GeoJson
        );
        assert_eq!(
            DecoderKind::for_content_type("application/vnd.geo+json").unwrap(),
            DecoderKind::GeoJson
        );
        assert_eq!(
            DecoderKind::for_content_type("application/vnd.google-earth.kml+xml; charset=UTF-8")
                .unwrap(),
            DecoderKind::Kml
        );
        assert_eq!(
            DecoderKind::for_content_type(" APPLICATION/VND.GOOGLE-EARTH.KMZ ").unwrap(),
            DecoderKind::Kmz
        );

        let error = DecoderKind::for_content_type("text/csv").unwrap_err();
        assert_eq!(error.kind(), "UnsupportedContentType");
        assert_eq!(error.status(), 415);
    }

    #[test]
    fn no_quick_summaries() {
        assert!(DecoderKind::iter().all(|kind| !kind.can_summarize_quickly()));
    }

    #[test]
    fn open_from_scratch() {
        let config = PipelineConfig::default();
        let mut store = ScratchStore::new(&config).unwrap();
        store
            .append(br#"<kml><Placemark><Point><coordinates>1,2</coordinates></Point></Placemark></kml>"#)
            .unwrap();
        store.seal().unwrap();

        let features: Vec<Feature> = DecoderKind::Kml
            .open(DecoderInput::Scratch(store), &config)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(features.len(), 1);
    }

    #[test]
    fn kml_from_json_is_rejected() {
        assert!(
            DecoderKind::Kml
                .open(DecoderInput::Json(Value::Null), &PipelineConfig::default())
                .is_err()
        );
    }
}
