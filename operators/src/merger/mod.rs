//! Groups decoded features into layers of identical schema.

use futures::{Stream, StreamExt};
use geoingest_datatypes::primitives::{BoundingBox2D, Feature, Geometry, JsonObject};
use geoingest_datatypes::reprojection::Reprojector;
use geoingest_datatypes::typed_value::{DomainColumn, TypedValue};
use tokio::sync::mpsc;
use tracing::Level;

use crate::config::PipelineConfig;
use crate::error::Error;
use crate::util::Result;

mod layer;

pub use self::layer::{Layer, LayerRows};
use self::layer::LayerBuilder;

/// Routes features into layers.
///
/// A feature joins the first layer, in creation order, whose column names equal
/// its own and whose column types accept its values. Otherwise it starts a new layer.
#[derive(Debug)]
pub struct Merger {
    config: PipelineConfig,
    reprojector: Reprojector,
    layers: Vec<LayerBuilder>,
}

impl Merger {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            reprojector: Reprojector::new(),
            layers: Vec::new(),
        }
    }

    /// Reprojects a feature into the canonical CRS and appends it to its layer.
    pub fn push(&mut self, feature: Feature) -> Result<()> {
        let (row, bbox) = self.candidate_row(feature)?;

        if let Some(layer) = self.layers.iter_mut().find(|layer| layer.accepts(&row)) {
            return layer.append(row, bbox);
        }

        let mut layer = LayerBuilder::new(&row, &self.config)?;

        tracing::info!(
            "Creating layer {} with columns {:?}",
            self.layers.len(),
            layer
                .columns()
                .iter()
                .map(|c| format!("{}: {}", c.name, c.ctype))
                .collect::<Vec<_>>()
        );

        layer.append(row, bbox)?;
        self.layers.push(layer);

        Ok(())
    }

    /// Seals all layers and returns them in creation order
    pub fn finish(self) -> Result<Vec<Layer>> {
        self.layers.into_iter().map(LayerBuilder::finish).collect()
    }

    /// Consumes a feature stream completely.
    ///
    /// Reprojection and scratch writes happen on a blocking worker that is fed
    /// through a channel of `row_buffer_size` features. The first error aborts
    /// the merge, all layers built so far are dropped.
    ///
    /// # Panics
    /// * if called outside of a tokio runtime
    ///
    pub async fn merge<S>(self, mut features: S) -> Result<Vec<Layer>>
    where
        S: Stream<Item = Result<Feature>> + Unpin,
    {
        let (sender, mut receiver) = mpsc::channel::<Feature>(self.config.row_buffer_size.max(1));
        let worker_span = tracing::span!(Level::TRACE, "merger_worker");

        // proj handles stay on the thread that uses them
        let Merger { config, layers, .. } = self;

        let worker = tokio::task::spawn_blocking(move || {
            let _entered_span = worker_span.enter();

            let mut merger = Merger {
                config,
                reprojector: Reprojector::new(),
                layers,
            };

            while let Some(feature) = receiver.blocking_recv() {
                merger.push(feature)?;
            }

            merger.finish()
        });

        let forwarded = async {
            while let Some(feature) = features.next().await {
                if sender.send(feature?).await.is_err() {
                    // the worker stopped on an error, it is returned below
                    break;
                }
            }
            Ok::<(), Error>(())
        }
        .await;

        drop(sender);

        let merged = worker.await?;
        forwarded?;
        let layers = merged?;

        tracing::debug!("Merged features into {} layers", layers.len());

        Ok(layers)
    }

    /// Like [`Merger::merge`], but emits the layers one by one once the input has ended
    pub fn merge_stream<S>(self, features: S) -> impl Stream<Item = Result<Layer>>
    where
        S: Stream<Item = Result<Feature>> + Unpin,
    {
        futures::stream::once(self.merge(features))
            .map(|result| match result {
                Ok(layers) => layers.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(error) => vec![Err(error)],
            })
            .flat_map(futures::stream::iter)
    }

    /// The row a feature would contribute and the extent of its geometry
    pub fn candidate_row(
        &mut self,
        feature: Feature,
    ) -> Result<(Vec<DomainColumn>, Option<BoundingBox2D>)> {
        let Feature {
            geometry,
            crs,
            properties,
        } = feature;

        let geometry = geometry
            .map(|g| self.reprojector.reproject_geometry(&g, crs.as_deref()))
            .transpose()?;

        let bbox = geometry.as_ref().and_then(Geometry::bbox);

        Ok((
            to_row(geometry, properties, &self.config.geometry_column),
            bbox,
        ))
    }
}

/// Lays out a feature as cells: the geometry column first, then the properties in document order.
pub fn to_row(
    geometry: Option<Geometry>,
    properties: JsonObject,
    geometry_column: &str,
) -> Vec<DomainColumn> {
    let mut row = Vec::with_capacity(properties.len() + 1);

    if let Some(geometry) = geometry {
        row.push(DomainColumn::new(geometry_column, geometry.into()));
    }

    for (name, value) in properties {
        if name == geometry_column {
            tracing::warn!("Dropping property {name}, it collides with the geometry column");
            continue;
        }

        row.push(DomainColumn::new(name, TypedValue::from_json(value)));
    }

    row
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use geoingest_datatypes::primitives::Coordinate2D;
    use geoingest_datatypes::typed_value::ColumnType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::summary::ColumnSummary;

    fn feature(geometry: Geometry, properties: serde_json::Value) -> Feature {
        let serde_json::Value::Object(properties) = properties else {
            panic!("properties must be an object");
        };
        Feature::new(Some(geometry), properties)
    }

    fn column_types(layer: &Layer) -> Vec<(String, ColumnType)> {
        layer
            .columns()
            .iter()
            .map(|ColumnSummary { name, ctype }| (name.clone(), *ctype))
            .collect()
    }

    #[test]
    fn homogeneous_features_share_a_layer() {
        let mut merger = Merger::new(PipelineConfig::default());

        for i in 0..5_i32 {
            merger
                .push(feature(
                    Geometry::Point((f64::from(i), 0.).into()),
                    json!({"name": format!("p{i}"), "value": i}),
                ))
                .unwrap();
        }

        let layers = merger.finish().unwrap();

        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].count(), 5);
        assert_eq!(
            column_types(&layers[0]),
            vec![
                ("the_geom".to_string(), ColumnType::Point),
                ("name".to_string(), ColumnType::Text),
                ("value".to_string(), ColumnType::Number),
            ]
        );
        assert_eq!(
            layers[0].bbox(),
            Some(BoundingBox2D::new((0., 0.).into(), (4., 0.).into()).unwrap())
        );
    }

    #[test]
    fn conflicts_create_layers() {
        let mut merger = Merger::new(PipelineConfig::default());

        merger
            .push(feature(Geometry::Point((0., 0.).into()), json!({"a": 1})))
            .unwrap();
        merger
            .push(feature(Geometry::MultiPoint(vec![(0., 0.).into()]), json!({"a": 1})))
            .unwrap();
        merger
            .push(feature(Geometry::Point((1., 1.).into()), json!({"a": "one"})))
            .unwrap();
        merger
            .push(feature(Geometry::Point((2., 2.).into()), json!({"a": 2})))
            .unwrap();
        merger
            .push(feature(Geometry::Point((2., 2.).into()), json!({"b": 2})))
            .unwrap();

        let layers = merger.finish().unwrap();

        let counts: Vec<u64> = layers.iter().map(Layer::count).collect();
        assert_eq!(counts, vec![2, 1, 1, 1]);
        assert_eq!(layers[1].columns()[0].ctype, ColumnType::MultiPoint);
        assert_eq!(layers[2].columns()[1].ctype, ColumnType::Text);
        assert_eq!(layers[3].columns()[1].name, "b");
    }

    #[test]
    fn null_joins_existing_layer() {
        let mut merger = Merger::new(PipelineConfig::default());

        merger
            .push(feature(Geometry::Point((0., 0.).into()), json!({"a": 1})))
            .unwrap();
        merger
            .push(feature(Geometry::Point((0., 0.).into()), json!({"a": null})))
            .unwrap();

        let layers = merger.finish().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].count(), 2);
    }

    #[test]
    fn null_starts_a_text_column() {
        let mut merger = Merger::new(PipelineConfig::default());

        merger
            .push(feature(Geometry::Point((0., 0.).into()), json!({"a": null})))
            .unwrap();

        let layers = merger.finish().unwrap();
        assert_eq!(layers[0].columns()[1].ctype, ColumnType::Text);
    }

    #[test]
    fn property_named_like_geometry_column_is_dropped() {
        let row = to_row(
            Some(Geometry::Point((0., 0.).into())),
            json!({"the_geom": "shadow", "a": true})
                .as_object()
                .unwrap()
                .clone(),
            "the_geom",
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row[0].ctype, ColumnType::Point);
        assert_eq!(row[1].name, "a");
    }

    #[test]
    fn features_without_geometry() {
        let mut merger = Merger::new(PipelineConfig::default());

        merger
            .push(Feature::new(None, json!({"a": 1}).as_object().unwrap().clone()))
            .unwrap();

        let layers = merger.finish().unwrap();
        assert_eq!(layers[0].geometry_column(), None);
        assert_eq!(layers[0].bbox(), None);
    }

    #[test]
    fn reprojects_into_canonical_crs() {
        let mut merger = Merger::new(PipelineConfig::default());

        merger
            .push(
                feature(
                    Geometry::Point((1_200_024.110_751_489, 5_626_245.609_297_535).into()),
                    json!({}),
                )
                .with_crs("EPSG:3857"),
            )
            .unwrap();

        let layers = merger.finish().unwrap();
        let rows: Vec<Vec<DomainColumn>> = layers[0].read().unwrap().collect::<Result<_>>().unwrap();

        let TypedValue::Point(Coordinate2D { x, y }) = rows[0][0].value else {
            panic!("expected a point");
        };
        assert!(approx_eq!(f64, x, 10.78, epsilon = 0.01));
        assert!(approx_eq!(f64, y, 45.03, epsilon = 0.01));
    }

    #[tokio::test]
    async fn unsupported_crs_fails_the_merge() {
        let features = futures::stream::iter(vec![
            Ok(feature(Geometry::Point((0., 0.).into()), json!({}))),
            Ok(feature(Geometry::Point((0., 0.).into()), json!({})).with_crs("EPSG:999999")),
        ]);

        let result = Merger::new(PipelineConfig::default()).merge(features).await;

        assert!(matches!(result, Err(Error::UnsupportedCrs { .. })));
    }

    #[tokio::test]
    async fn merge_continues_pushed_layers() {
        let mut merger = Merger::new(PipelineConfig {
            row_buffer_size: 1,
            ..Default::default()
        });
        merger
            .push(feature(Geometry::Point((0., 0.).into()), json!({"a": 1})))
            .unwrap();

        let features = futures::stream::iter((1..20_i32).map(|i| {
            Ok(feature(
                Geometry::Point((f64::from(i), 0.).into()),
                json!({"a": i}),
            ))
        }));

        let layers = merger.merge(features).await.unwrap();

        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].count(), 20);
    }

    #[tokio::test]
    async fn decoder_error_fails_the_merge() {
        let features = futures::stream::iter(vec![
            Ok(feature(Geometry::Point((0., 0.).into()), json!({}))),
            Err(Error::parse("broken", None)),
        ]);

        let layers: Vec<Result<Layer>> = Merger::new(PipelineConfig::default())
            .merge_stream(features)
            .collect()
            .await;

        assert_eq!(layers.len(), 1);
        assert!(matches!(layers[0], Err(Error::Parse { .. })));
    }
}
