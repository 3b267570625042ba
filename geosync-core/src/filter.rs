//! Read-side SELECT generation from declarative filter queries.
//!
//! A [`FilterQuery`] names a dataset, its geometry column and a filter
//! geometry whose envelope bounds the result. Each backend renders the query
//! through its own [`FilterSqlBuilder`].

use std::fmt;

use geo::{BoundingRect, Geometry, Rect};
use thiserror::Error;

use crate::{
    codec::{EwkbCodec, GeometryCodec},
    table::{TableName, quote_identifier},
};

/// Spatial reference identifier, possibly unset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpatialReferenceSystemId {
    /// No reference known.
    #[default]
    Unset,
    /// A concrete identifier such as `4326`.
    Id(String),
}

impl SpatialReferenceSystemId {
    /// The identifier text, or `None` when unset or blank.
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Id(id) if !id.trim().is_empty() => Some(id.trim()),
            _ => None,
        }
    }

    /// Whether no usable identifier is present.
    pub fn is_unset(&self) -> bool {
        self.as_id().is_none()
    }
}

impl From<i32> for SpatialReferenceSystemId {
    fn from(value: i32) -> Self {
        Self::Id(value.to_string())
    }
}

impl From<&str> for SpatialReferenceSystemId {
    fn from(value: &str) -> Self {
        Self::Id(value.to_owned())
    }
}

impl fmt::Display for SpatialReferenceSystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_id() {
            Some(id) => f.write_str(id),
            None => f.write_str("unset"),
        }
    }
}

/// Maximum number of rows a query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    /// No cap.
    #[default]
    Unbounded,
    /// At most this many rows; zero means no cap.
    Rows(u64),
}

impl Limit {
    /// Row cap to emit, if the limit is finite and positive.
    pub const fn rows(self) -> Option<u64> {
        match self {
            Self::Rows(n) if n > 0 => Some(n),
            _ => None,
        }
    }
}

impl From<u64> for Limit {
    fn from(value: u64) -> Self {
        if value == u64::MAX {
            Self::Unbounded
        } else {
            Self::Rows(value)
        }
    }
}

/// A bounding-box read request.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    dataset: TableName,
    geometry_attribute: String,
    filter_geometry: Geometry<f64>,
    srid: SpatialReferenceSystemId,
    condition: Option<String>,
    limit: Limit,
}

impl FilterQuery {
    /// A query over `dataset` (optionally `schema.table`) keeping rows whose
    /// `geometry_attribute` intersects the envelope of `filter_geometry`.
    pub fn new(
        dataset: &str,
        geometry_attribute: impl Into<String>,
        filter_geometry: Geometry<f64>,
    ) -> Self {
        Self {
            dataset: TableName::parse(dataset),
            geometry_attribute: geometry_attribute.into(),
            filter_geometry,
            srid: SpatialReferenceSystemId::Unset,
            condition: None,
            limit: Limit::Unbounded,
        }
    }

    /// Tag the envelope with `srid`.
    #[must_use]
    pub fn with_srid(mut self, srid: impl Into<SpatialReferenceSystemId>) -> Self {
        self.srid = srid.into();
        self
    }

    /// Append a raw condition. The text is trusted and emitted verbatim.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Cap the number of returned rows.
    #[must_use]
    pub fn with_limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = limit.into();
        self
    }

    /// Target table.
    pub const fn dataset(&self) -> &TableName {
        &self.dataset
    }

    /// Geometry column name.
    pub fn geometry_attribute(&self) -> &str {
        &self.geometry_attribute
    }

    /// Filter geometry.
    pub const fn filter_geometry(&self) -> &Geometry<f64> {
        &self.filter_geometry
    }

    /// Reference requested by the query.
    pub const fn srid(&self) -> &SpatialReferenceSystemId {
        &self.srid
    }

    /// Raw condition, if any.
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Row cap.
    pub const fn limit(&self) -> Limit {
        self.limit
    }

    /// Envelope of the filter geometry.
    pub fn envelope(&self) -> Result<Rect<f64>, FilterError> {
        self.filter_geometry
            .bounding_rect()
            .ok_or(FilterError::EmptyFilterGeometry)
    }
}

/// Errors raised while rendering a filter query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The filter geometry has no envelope.
    #[error("filter geometry is empty and has no envelope")]
    EmptyFilterGeometry,
}

/// Renders a [`FilterQuery`] as SQL for one backend.
pub trait FilterSqlBuilder {
    /// SELECT text for `query`.
    fn sql(&self, query: &FilterQuery) -> Result<String, FilterError>;
}

fn projection(codec: &dyn GeometryCodec, geometry: &str, columns: &[String]) -> String {
    let mut list = format!(
        "{} as {}",
        codec.decode_column_expression(geometry),
        quote_identifier(geometry)
    );
    for column in columns {
        if !column.eq_ignore_ascii_case(geometry) {
            list.push_str(", ");
            list.push_str(&quote_identifier(column));
        }
    }
    list
}

fn push_tail(sql: &mut String, query: &FilterQuery) {
    if let Some(condition) = query.condition() {
        sql.push_str(" AND ");
        sql.push_str(condition);
    }
    if let Some(rows) = query.limit().rows() {
        sql.push_str(&format!(" LIMIT {rows}"));
    }
}

/// Builds PostGIS SELECT statements with a `&&` box filter.
///
/// # Examples
///
/// ```
/// use geo::{Geometry, Rect, coord};
/// use geosync_core::{FilterQuery, FilterSqlBuilder, PostgisSqlBuilder};
///
/// # fn main() -> Result<(), geosync_core::FilterError> {
/// let window = Geometry::Rect(Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 }));
/// let query = FilterQuery::new("public.roads", "geom", window).with_limit(0_u64);
/// let builder = PostgisSqlBuilder::new(vec!["name".into()]);
/// assert_eq!(
///     builder.sql(&query)?,
///     "SELECT ST_AsEWKB(\"geom\") as \"geom\", \"name\" FROM \"public\".\"roads\" t \
///      WHERE \"geom\" && ST_SetSRID('BOX3D(0 0,10 10)'::box3d, ST_SRID(\"geom\"))"
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PostgisSqlBuilder {
    default_srid: SpatialReferenceSystemId,
    columns: Vec<String>,
    codec: EwkbCodec,
}

impl PostgisSqlBuilder {
    /// Builder projecting `columns` after the geometry column.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            default_srid: SpatialReferenceSystemId::Unset,
            columns,
            codec: EwkbCodec::postgis(),
        }
    }

    /// Reference used when the query does not carry one.
    #[must_use]
    pub fn with_default_srid(mut self, srid: impl Into<SpatialReferenceSystemId>) -> Self {
        self.default_srid = srid.into();
        self
    }

    fn resolve_srid(&self, query: &FilterQuery) -> String {
        query
            .srid()
            .as_id()
            .or_else(|| self.default_srid.as_id())
            .map_or_else(
                || format!("ST_SRID({})", quote_identifier(query.geometry_attribute())),
                str::to_owned,
            )
    }
}

impl FilterSqlBuilder for PostgisSqlBuilder {
    fn sql(&self, query: &FilterQuery) -> Result<String, FilterError> {
        let envelope = query.envelope()?;
        let geometry = query.geometry_attribute();
        let mut sql = format!(
            "SELECT {} FROM {} t WHERE {} && ST_SetSRID('BOX3D({} {},{} {})'::box3d, {})",
            projection(&self.codec, geometry, &self.columns),
            query.dataset().quoted(),
            quote_identifier(geometry),
            envelope.min().x,
            envelope.min().y,
            envelope.max().x,
            envelope.max().y,
            self.resolve_srid(query),
        );
        push_tail(&mut sql, query);
        Ok(sql)
    }
}

/// Name of the envelope predicate registered by the SQLite backend.
pub const SQLITE_ENVELOPE_FUNCTION: &str = "ST_EnvIntersects";

/// Builds SELECT statements for the SQLite backend, where geometries are EWKB
/// blobs filtered by [`SQLITE_ENVELOPE_FUNCTION`].
#[derive(Debug, Clone)]
pub struct SqliteSqlBuilder {
    columns: Vec<String>,
    codec: EwkbCodec,
}

impl SqliteSqlBuilder {
    /// Builder projecting `columns` after the geometry column.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            codec: EwkbCodec::blob(),
        }
    }
}

impl FilterSqlBuilder for SqliteSqlBuilder {
    fn sql(&self, query: &FilterQuery) -> Result<String, FilterError> {
        let envelope = query.envelope()?;
        let geometry = query.geometry_attribute();
        let mut sql = format!(
            "SELECT {} FROM {} t WHERE {SQLITE_ENVELOPE_FUNCTION}({}, {}, {}, {}, {})",
            projection(&self.codec, geometry, &self.columns),
            query.dataset().quoted(),
            quote_identifier(geometry),
            envelope.min().x,
            envelope.min().y,
            envelope.max().x,
            envelope.max().y,
        );
        push_tail(&mut sql, query);
        Ok(sql)
    }
}
