//! `query` command: read a SQLite layer through the filter query path.

use std::{io::Write, sync::Arc};

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use geo::{Geometry, Rect};
use geosync_core::{
    Backend, ConnectionDescriptor, Dimension, EwkbCodec, Feature, FeatureSchema, FilterQuery,
    GeometryCodec, ObjectValue, TableName, Value, open_connection,
};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{
    ARG_BBOX, ARG_DATABASE, ARG_DATASET, CliError, ENV_QUERY_BBOX, ENV_QUERY_DATABASE,
    ENV_QUERY_DATASET, fs::file_is_file, parse_bbox,
};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// CLI arguments for the `query` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "query",
    long_about = "Open a SQLite store written by geosync, describe the \
                 dataset's table and print every feature whose geometry \
                 envelope intersects the bounding box, one JSON object per \
                 line. Geometries are printed as hex-encoded plain WKB \
                 (two dimensions, no SRID tag); the layer's SRID is not \
                 repeated per row.",
    about = "Read the features of a SQLite layer inside a bounding box"
)]
#[ortho_config(prefix = "GEOSYNC")]
pub(crate) struct QueryArgs {
    /// Path to the SQLite database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Dataset to read, optionally `schema.table`.
    #[arg(long = ARG_DATASET, value_name = "name")]
    #[serde(default)]
    pub(crate) dataset: Option<String>,
    /// Geometry column; defaults to the table's registered geometry.
    #[arg(long, value_name = "column")]
    #[serde(default)]
    pub(crate) geometry: Option<String>,
    /// Bounding box as `minx,miny,maxx,maxy`.
    #[arg(long = ARG_BBOX, value_name = "box", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) bbox: Option<String>,
    /// Extra SQL predicate ANDed after the box filter.
    #[arg(long, value_name = "sql")]
    #[serde(default)]
    pub(crate) condition: Option<String>,
    /// Maximum number of rows; zero means no cap.
    #[arg(long, value_name = "rows")]
    #[serde(default)]
    pub(crate) limit: Option<u64>,
}

impl QueryArgs {
    pub(crate) fn into_config(self) -> Result<QueryConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        QueryConfig::try_from(merged)
    }
}

/// Resolved `query` configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) dataset: String,
    pub(crate) geometry: Option<String>,
    pub(crate) bbox: Rect<f64>,
    pub(crate) condition: Option<String>,
    pub(crate) limit: Option<u64>,
}

impl QueryConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        Self::require_existing(&self.database, ARG_DATABASE)
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match file_is_file(path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingSourceFile {
                    field,
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(CliError::InspectSourcePath {
                field,
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn query(&self, schema: &FeatureSchema) -> FilterQuery {
        let geometry = self
            .geometry
            .clone()
            .unwrap_or_else(|| schema.geometry_name().to_owned());
        let mut query = FilterQuery::new(&self.dataset, geometry, Geometry::Rect(self.bbox));
        if let Some(condition) = &self.condition {
            query = query.with_condition(condition.clone());
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        query
    }
}

impl TryFrom<QueryArgs> for QueryConfig {
    type Error = CliError;

    fn try_from(args: QueryArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_QUERY_DATABASE,
        })?;
        let dataset = args.dataset.ok_or(CliError::MissingArgument {
            field: ARG_DATASET,
            env: ENV_QUERY_DATASET,
        })?;
        let bbox = args.bbox.ok_or(CliError::MissingArgument {
            field: ARG_BBOX,
            env: ENV_QUERY_BBOX,
        })?;
        Ok(Self {
            database,
            dataset,
            geometry: args.geometry,
            bbox: parse_bbox(&bbox)?,
            condition: args.condition,
            limit: args.limit,
        })
    }
}

pub(crate) fn run_query(args: QueryArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    execute_query(&config, writer)
}

pub(crate) fn execute_query(config: &QueryConfig, writer: &mut dyn Write) -> Result<(), CliError> {
    let descriptor = ConnectionDescriptor::new(Backend::Sqlite {
        path: config.database.clone().into_std_path_buf(),
    });
    let mut connection = open_connection(&descriptor)?;
    let table = TableName::parse(&config.dataset);
    let schema = Arc::new(connection.describe_table(&table)?);
    let features = connection.query(&config.query(&schema), &schema)?;

    let codec = EwkbCodec::blob();
    for feature in &features {
        let object = feature_json(&codec, feature)?;
        let line = serde_json::to_string(&object).map_err(CliError::SerializeFeature)?;
        writeln!(writer, "{line}").map_err(CliError::WriteOutput)?;
    }
    Ok(())
}

/// One JSON object holding the feature id and every attribute by name.
///
/// Geometries are planar in memory and carry no SRID, so they are written as
/// untagged two-dimensional WKB.
pub(crate) fn feature_json(
    codec: &dyn GeometryCodec,
    feature: &Feature,
) -> Result<Map<String, JsonValue>, CliError> {
    let mut object = Map::new();
    object.insert("id".to_owned(), JsonValue::from(feature.id().0));
    for (definition, value) in feature.schema().attributes().iter().zip(feature.values()) {
        let encode = |geometry: &Geometry<f64>| {
            codec
                .encode(geometry, None, Dimension::Xy)
                .map(|bytes| JsonValue::String(hex::encode(bytes)))
                .map_err(|source| CliError::EncodeGeometry {
                    feature: feature.id().0,
                    attribute: definition.name.clone(),
                    source,
                })
        };
        let json = match value {
            Value::Null => JsonValue::Null,
            Value::String(text) | Value::Object(ObjectValue::Text(text)) => {
                JsonValue::String(text.clone())
            }
            Value::Integer(number) => JsonValue::from(*number),
            Value::Double(number) => JsonValue::from(*number),
            Value::Date(date) => JsonValue::String(date.format(DATE_FORMAT).to_string()),
            Value::Geometry(geometry) | Value::Object(ObjectValue::Geometry(geometry)) => {
                encode(geometry)?
            }
            Value::Object(ObjectValue::Bytes(bytes)) => JsonValue::String(hex::encode(bytes)),
        };
        object.insert(definition.name.clone(), json);
    }
    Ok(object)
}
