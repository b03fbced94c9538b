use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Write};

use geoingest_datatypes::primitives::BoundingBox2D;
use geoingest_datatypes::typed_value::{DomainColumn, TypedValue};
use serde_json::de::IoRead;
use serde_json::{Deserializer, StreamDeserializer};
use snafu::ResultExt;

use crate::config::PipelineConfig;
use crate::error;
use crate::scratch::ScratchStore;
use crate::summary::{ColumnSummary, LayerSummary};
use crate::util::Result;

/// A homogeneous set of features: one column schema and a re-readable row sequence.
///
/// Rows live in a scratch file that is removed together with the layer.
#[derive(Debug)]
pub struct Layer {
    columns: Vec<ColumnSummary>,
    rows: ScratchStore,
    bbox: Option<BoundingBox2D>,
    count: u64,
}

impl Layer {
    pub fn columns(&self) -> &[ColumnSummary] {
        &self.columns
    }

    pub fn bbox(&self) -> Option<BoundingBox2D> {
        self.bbox
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The geometry column, it always comes first
    pub fn geometry_column(&self) -> Option<&ColumnSummary> {
        self.columns.first().filter(|c| c.ctype.is_geometry())
    }

    pub fn summary(&self) -> LayerSummary {
        LayerSummary {
            columns: self.columns.clone(),
            count: Some(self.count),
            bbox: self.bbox,
        }
    }

    /// Starts a new pass over all rows
    pub fn read(&self) -> Result<LayerRows<'_>> {
        Ok(LayerRows {
            columns: &self.columns,
            rows: Deserializer::from_reader(self.rows.reader()?).into_iter(),
        })
    }

    /// Encodes the layer as a GeoJSON `FeatureCollection`
    pub fn to_geojson(&self) -> Result<geojson::FeatureCollection> {
        let has_geometry = self.geometry_column().is_some();

        let features = self
            .read()?
            .map(|row| {
                let mut cells = row?.into_iter();

                let geometry = if has_geometry {
                    cells
                        .next()
                        .and_then(|cell| cell.value.as_geometry())
                        .map(|g| geojson::Geometry::from(&g))
                } else {
                    None
                };

                let properties = cells.map(|cell| (cell.name, cell.value.to_json())).collect();

                Ok(geojson::Feature {
                    bbox: None,
                    geometry,
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(geojson::FeatureCollection {
            bbox: self
                .bbox
                .map(|b| vec![b.min_x(), b.min_y(), b.max_x(), b.max_y()]),
            features,
            foreign_members: None,
        })
    }
}

/// The rows of a [`Layer`], each as cells in column order
pub struct LayerRows<'l> {
    columns: &'l [ColumnSummary],
    rows: StreamDeserializer<'static, IoRead<BufReader<File>>, Vec<TypedValue>>,
}

impl Iterator for LayerRows<'_> {
    type Item = Result<Vec<DomainColumn>>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = match self.rows.next()? {
            Ok(values) => values,
            Err(source) => return Some(Err(error::Error::RowSerialization { source })),
        };

        Some(Ok(self
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| DomainColumn {
                name: column.name.clone(),
                ctype: column.ctype,
                value,
            })
            .collect()))
    }
}

/// A layer that still accepts rows
#[derive(Debug)]
pub(crate) struct LayerBuilder {
    columns: Vec<ColumnSummary>,
    rows: ScratchStore,
    bbox: Option<BoundingBox2D>,
    count: u64,
}

impl LayerBuilder {
    /// Creates a layer with the schema of `row`
    pub fn new(row: &[DomainColumn], config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            columns: row
                .iter()
                .map(|cell| ColumnSummary {
                    name: cell.name.clone(),
                    ctype: cell.ctype,
                })
                .collect(),
            rows: ScratchStore::new(config)?,
            bbox: None,
            count: 0,
        })
    }

    pub fn columns(&self) -> &[ColumnSummary] {
        &self.columns
    }

    /// A row fits if it has exactly the layer's column names and every value fits its column type
    pub fn accepts(&self, row: &[DomainColumn]) -> bool {
        row.len() == self.columns.len()
            && row.iter().all(|cell| {
                self.columns
                    .iter()
                    .find(|column| column.name == cell.name)
                    .is_some_and(|column| cell.merge_type_with(column.ctype).is_ok())
            })
    }

    /// Appends a row that was accepted, cells are stored in column order
    pub fn append(&mut self, row: Vec<DomainColumn>, bbox: Option<BoundingBox2D>) -> Result<()> {
        let mut cells: HashMap<String, TypedValue> =
            row.into_iter().map(|cell| (cell.name, cell.value)).collect();

        let values: Vec<TypedValue> = self
            .columns
            .iter()
            .map(|column| cells.remove(&column.name).unwrap_or(TypedValue::Null))
            .collect();

        let writer = self.rows.writer()?;
        serde_json::to_writer(&mut *writer, &values).context(error::RowSerializationSnafu)?;
        writer.write_all(b"\n")?;

        if let Some(bbox) = bbox {
            match &mut self.bbox {
                Some(extent) => extent.extend_with_bbox(&bbox),
                None => self.bbox = Some(bbox),
            }
        }

        self.count += 1;

        Ok(())
    }

    pub fn finish(mut self) -> Result<Layer> {
        self.rows.seal()?;

        Ok(Layer {
            columns: self.columns,
            rows: self.rows,
            bbox: self.bbox,
            count: self.count,
        })
    }
}
