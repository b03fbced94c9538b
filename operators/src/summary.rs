//! Column schemas of the layers an upload would produce.

use futures::StreamExt;
use geoingest_datatypes::primitives::BoundingBox2D;
use geoingest_datatypes::typed_value::{ColumnType, DomainColumn};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::decoders::{DecoderInput, DecoderKind, decode_stream};
use crate::merger::Merger;
use crate::util::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub ctype: ColumnType,
}

impl From<&DomainColumn> for ColumnSummary {
    fn from(column: &DomainColumn) -> Self {
        Self {
            name: column.name.clone(),
            ctype: column.ctype,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub columns: Vec<ColumnSummary>,
    /// unknown if only a prefix of the input was read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox2D>,
}

/// How much of the input is decoded to describe it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryStrategy {
    /// decode and merge everything
    Full,
    /// describe only the layer of the first feature
    FirstFeature,
}

impl SummaryStrategy {
    /// Large or unsized inputs are abbreviated to their first feature.
    pub fn choose(kind: DecoderKind, blob_length: Option<u64>, config: &PipelineConfig) -> Self {
        if kind.can_summarize_quickly() {
            return SummaryStrategy::FirstFeature;
        }

        match blob_length {
            Some(length) if length < config.abbreviate_summary_size => SummaryStrategy::Full,
            _ => SummaryStrategy::FirstFeature,
        }
    }
}

/// Summarizes `input` with the strategy chosen for its kind and length
pub async fn summarize(
    kind: DecoderKind,
    input: DecoderInput,
    blob_length: Option<u64>,
    config: &PipelineConfig,
) -> Result<Vec<LayerSummary>> {
    let strategy = SummaryStrategy::choose(kind, blob_length, config);

    tracing::debug!("Summarizing {kind:?} input of {blob_length:?} bytes with {strategy:?}");

    match strategy {
        SummaryStrategy::Full => summarize_full(kind, input, config).await,
        SummaryStrategy::FirstFeature => summarize_first_feature(kind, input, config).await,
    }
}

/// Merges the complete input and reports every layer
pub async fn summarize_full(
    kind: DecoderKind,
    input: DecoderInput,
    config: &PipelineConfig,
) -> Result<Vec<LayerSummary>> {
    let layers = Merger::new(config.clone())
        .merge(decode_stream(kind, input, config))
        .await?;

    Ok(layers.iter().map(|layer| layer.summary()).collect())
}

/// Reports the schema of the first feature's layer.
///
/// The decoder is stopped after the first feature, an empty input has no layers.
pub async fn summarize_first_feature(
    kind: DecoderKind,
    input: DecoderInput,
    config: &PipelineConfig,
) -> Result<Vec<LayerSummary>> {
    let mut features = decode_stream(kind, input, config);

    let Some(feature) = features.next().await.transpose()? else {
        return Ok(Vec::new());
    };

    drop(features);

    let (row, bbox) = Merger::new(config.clone()).candidate_row(feature)?;

    Ok(vec![LayerSummary {
        columns: row.iter().map(ColumnSummary::from).collect(),
        count: None,
        bbox,
    }])
}
