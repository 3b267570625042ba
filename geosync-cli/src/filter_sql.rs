//! `filter-sql` command: render the PostGIS read query for a bounding box.

use std::io::Write;

use clap::Parser;
use geo::{Geometry, Rect};
use geosync_core::{FilterQuery, FilterSqlBuilder, PostgisSqlBuilder};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BBOX, ARG_DATASET, CliError, ENV_FILTER_SQL_BBOX, ENV_FILTER_SQL_DATASET, parse_bbox,
    parse_columns,
};

const DEFAULT_GEOMETRY_COLUMN: &str = "geom";

/// CLI arguments for the `filter-sql` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "filter-sql",
    long_about = "Render the SELECT a PostGIS store runs to read the features \
                 of a dataset whose geometry envelope intersects a bounding \
                 box. Values can come from CLI flags, configuration files, or \
                 environment variables.",
    about = "Render the PostGIS SELECT for a bounding-box read"
)]
#[ortho_config(prefix = "GEOSYNC")]
pub(crate) struct FilterSqlArgs {
    /// Dataset to read, optionally `schema.table`.
    #[arg(long = ARG_DATASET, value_name = "name")]
    #[serde(default)]
    pub(crate) dataset: Option<String>,
    /// Geometry column (defaults to `geom`).
    #[arg(long, value_name = "column")]
    #[serde(default)]
    pub(crate) geometry: Option<String>,
    /// Comma-separated attribute columns to project after the geometry.
    #[arg(long, value_name = "list")]
    #[serde(default)]
    pub(crate) columns: Option<String>,
    /// Bounding box as `minx,miny,maxx,maxy`.
    #[arg(long = ARG_BBOX, value_name = "box", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) bbox: Option<String>,
    /// SRID of the bounding box.
    #[arg(long, value_name = "id")]
    #[serde(default)]
    pub(crate) srid: Option<String>,
    /// SRID used when `--srid` is not given.
    #[arg(long, value_name = "id")]
    #[serde(default)]
    pub(crate) default_srid: Option<String>,
    /// Extra SQL predicate ANDed after the box filter.
    #[arg(long, value_name = "sql")]
    #[serde(default)]
    pub(crate) condition: Option<String>,
    /// Maximum number of rows; zero means no cap.
    #[arg(long, value_name = "rows")]
    #[serde(default)]
    pub(crate) limit: Option<u64>,
}

impl FilterSqlArgs {
    pub(crate) fn into_config(self) -> Result<FilterSqlConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        FilterSqlConfig::try_from(merged)
    }
}

/// Resolved `filter-sql` configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilterSqlConfig {
    pub(crate) dataset: String,
    pub(crate) geometry: String,
    pub(crate) columns: Vec<String>,
    pub(crate) bbox: Rect<f64>,
    pub(crate) srid: Option<String>,
    pub(crate) default_srid: Option<String>,
    pub(crate) condition: Option<String>,
    pub(crate) limit: Option<u64>,
}

impl FilterSqlConfig {
    pub(crate) fn query(&self) -> FilterQuery {
        let mut query = FilterQuery::new(
            &self.dataset,
            self.geometry.clone(),
            Geometry::Rect(self.bbox),
        );
        if let Some(srid) = &self.srid {
            query = query.with_srid(srid.as_str());
        }
        if let Some(condition) = &self.condition {
            query = query.with_condition(condition.clone());
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        query
    }

    pub(crate) fn render(&self) -> Result<String, CliError> {
        let mut builder = PostgisSqlBuilder::new(self.columns.clone());
        if let Some(default_srid) = &self.default_srid {
            builder = builder.with_default_srid(default_srid.as_str());
        }
        Ok(builder.sql(&self.query())?)
    }
}

impl TryFrom<FilterSqlArgs> for FilterSqlConfig {
    type Error = CliError;

    fn try_from(args: FilterSqlArgs) -> Result<Self, Self::Error> {
        let dataset = args.dataset.ok_or(CliError::MissingArgument {
            field: ARG_DATASET,
            env: ENV_FILTER_SQL_DATASET,
        })?;
        let bbox = args.bbox.ok_or(CliError::MissingArgument {
            field: ARG_BBOX,
            env: ENV_FILTER_SQL_BBOX,
        })?;
        Ok(Self {
            dataset,
            geometry: args
                .geometry
                .unwrap_or_else(|| DEFAULT_GEOMETRY_COLUMN.to_owned()),
            columns: parse_columns(args.columns.as_deref()),
            bbox: parse_bbox(&bbox)?,
            srid: args.srid,
            default_srid: args.default_srid,
            condition: args.condition,
            limit: args.limit,
        })
    }
}

pub(crate) fn run_filter_sql(args: FilterSqlArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    write_sql(writer, &config)
}

pub(crate) fn write_sql(writer: &mut dyn Write, config: &FilterSqlConfig) -> Result<(), CliError> {
    let sql = config.render()?;
    writeln!(writer, "{sql}").map_err(CliError::WriteOutput)
}
