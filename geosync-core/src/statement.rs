//! Translate evolutions into parameterised SQL.
//!
//! Inserts write every attribute except the database key. Modifications are
//! written as one `UPDATE` per changed column so a commit never overwrites a
//! value another client changed concurrently unless this session changed it
//! too. Every `UPDATE` is keyed on the last committed primary key, so a change
//! to the key column itself is written last. Deletions are keyed the same way.

use std::fmt;

use chrono::NaiveDateTime;
use geo::Geometry;
use log::debug;
use thiserror::Error;

use crate::{
    codec::{CodecError, Dimension, GeometryCodec},
    evolution::Evolution,
    feature::{Feature, FeatureId, ObjectValue, Value},
    schema::{AttributeDefinition, AttributeType},
    table::{TableName, quote_identifier, quote_literal},
};

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// SQL NULL.
    Null,
    /// Text.
    Text(String),
    /// 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Double(f64),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
    /// Binary payload, used for encoded geometries.
    Blob(Vec<u8>),
}

/// SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlParam>,
}

impl Statement {
    /// Pair `sql` with `params`.
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters in placeholder order.
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Double(number) => write!(f, "{number}"),
            Self::Timestamp(timestamp) => write!(f, "{timestamp}"),
            Self::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        f.write_str(" [")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str("]")
    }
}

/// Errors raised while building statements.
#[derive(Debug, Error)]
pub enum StatementError {
    /// A value does not fit the declared type of its attribute.
    #[error("attribute `{attribute}` is declared {expected} but holds a {found} value")]
    TypeMismatch {
        /// Attribute name.
        attribute: String,
        /// Declared type.
        expected: AttributeType,
        /// Variant found.
        found: &'static str,
    },
    /// The stored row cannot be addressed: no key is configured, the schema
    /// lacks it, or its value is null.
    #[error("feature {feature} has no primary key value addressing its stored row")]
    MissingPrimaryKey {
        /// Session identifier of the feature.
        feature: FeatureId,
        /// Configured key attribute, if any.
        primary_key: Option<String>,
    },
    /// The key holds a value that cannot address a row: a geometry, an
    /// object, or a NaN or infinite double.
    #[error("primary key `{primary_key}` holds an unsupported {found} value")]
    UnsupportedPrimaryKey {
        /// Key attribute name.
        primary_key: String,
        /// Variant found.
        found: &'static str,
    },
    /// Geometry encoding failed.
    #[error("failed to encode attribute `{attribute}`")]
    Codec {
        /// Attribute name.
        attribute: String,
        /// Underlying codec error.
        #[source]
        source: CodecError,
    },
}

/// Builds write statements for one table.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use geosync_core::{
///     AttributeDefinition, AttributeType, Dimension, EwkbCodec, Evolution, Feature, FeatureId,
///     FeatureSchema, SqlParam, StatementBuilder, TableName, Value,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let schema = Arc::new(
///     FeatureSchema::new(vec![
///         AttributeDefinition::new("id", AttributeType::Integer),
///         AttributeDefinition::new("geom", AttributeType::Geometry),
///     ])?
///     .with_external_primary_key("id")?,
/// );
/// let old = Feature::new(FeatureId(1), schema, vec![Value::Integer(7), Value::Null])?;
///
/// let codec = EwkbCodec::postgis();
/// let builder = StatementBuilder::new(TableName::parse("public.t"), &codec)
///     .with_primary_key("id")
///     .with_srid(None)
///     .with_dimension(Dimension::Xy);
/// let statements = builder.for_evolution(&Evolution::suppression(old))?;
/// assert_eq!(statements[0].sql(), r#"DELETE FROM "public"."t" WHERE "id" = ?"#);
/// assert_eq!(statements[0].params(), &[SqlParam::Integer(7)]);
/// # Ok(())
/// # }
/// ```
pub struct StatementBuilder<'c> {
    table: TableName,
    primary_key: Option<String>,
    srid: Option<i32>,
    dimension: Dimension,
    normalized_column_names: bool,
    codec: &'c dyn GeometryCodec,
}

impl fmt::Debug for StatementBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementBuilder")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("srid", &self.srid)
            .field("dimension", &self.dimension)
            .field("normalized_column_names", &self.normalized_column_names)
            .finish_non_exhaustive()
    }
}

impl<'c> StatementBuilder<'c> {
    /// Builder for `table` encoding geometries with `codec`.
    ///
    /// Geometries are written in two dimensions without an SRID, and no
    /// primary key is known, until configured otherwise. Without a key only
    /// inserts can be built.
    pub fn new(table: TableName, codec: &'c dyn GeometryCodec) -> Self {
        Self {
            table,
            primary_key: None,
            srid: None,
            dimension: Dimension::Xy,
            normalized_column_names: false,
            codec,
        }
    }

    /// Attribute holding the database key. It is left out of inserts and
    /// addresses updates and deletes.
    #[must_use]
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    /// SRID tagged onto GEOMETRY values.
    #[must_use]
    pub const fn with_srid(mut self, srid: Option<i32>) -> Self {
        self.srid = srid;
        self
    }

    /// Dimension of written GEOMETRY values.
    #[must_use]
    pub const fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = dimension;
        self
    }

    /// Lower-case column names in generated SQL.
    #[must_use]
    pub const fn with_normalized_column_names(mut self, normalized: bool) -> Self {
        self.normalized_column_names = normalized;
        self
    }

    /// Target table.
    pub const fn table(&self) -> &TableName {
        &self.table
    }

    /// Key attribute name.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Statements that apply `evolution`.
    ///
    /// Creations and suppressions yield exactly one statement; modifications
    /// yield one per changed attribute, possibly none.
    pub fn for_evolution(&self, evolution: &Evolution) -> Result<Vec<Statement>, StatementError> {
        let statements = match evolution {
            Evolution::Creation { new } => vec![self.insert(new)?],
            Evolution::Modification { old, new } => self.updates(old, new)?,
            Evolution::Suppression { old } => vec![self.delete(old)?],
        };
        for statement in &statements {
            debug!("{statement}");
        }
        Ok(statements)
    }

    /// `INSERT` of every attribute of `feature` except the primary key.
    pub fn insert(&self, feature: &Feature) -> Result<Statement, StatementError> {
        let schema = feature.schema();
        let mut columns = Vec::with_capacity(schema.len());
        let mut params = Vec::with_capacity(schema.len());
        for (definition, value) in schema.attributes().iter().zip(feature.values()) {
            if self.primary_key.as_deref() == Some(definition.name.as_str()) {
                continue;
            }
            params.push(self.bind(definition, value)?);
            columns.push(self.column(&definition.name));
        }
        let placeholders = vec!["?"; params.len()].join(",");
        let sql = format!(
            "INSERT INTO {}({}) VALUES({placeholders})",
            self.table.quoted(),
            columns.join(",")
        );
        Ok(Statement::new(sql, params))
    }

    /// One `UPDATE` per attribute whose value differs between `old` and
    /// `new`, addressed by the key of the committed row. A changed key is
    /// written after every other column.
    pub fn updates(&self, old: &Feature, new: &Feature) -> Result<Vec<Statement>, StatementError> {
        let schema = new.schema();
        let mut changed: Vec<_> = schema
            .attributes()
            .iter()
            .enumerate()
            .filter(|(index, _)| old.value(*index) != new.value(*index))
            .collect();
        if changed.is_empty() {
            return Ok(Vec::new());
        }
        changed.sort_by_key(|(_, definition)| {
            self.primary_key.as_deref() == Some(definition.name.as_str())
        });

        let (primary_key, key) = self.key_literal(old)?;
        let table = self.table.quoted();
        let primary_key = quote_identifier(primary_key);
        changed
            .into_iter()
            .map(|(index, definition)| {
                let param = self.bind(definition, new.value(index))?;
                let sql = format!(
                    "UPDATE {table} SET {} = ? WHERE {primary_key} = {key}",
                    self.column(&definition.name)
                );
                Ok(Statement::new(sql, vec![param]))
            })
            .collect()
    }

    /// `DELETE` of the row holding `old`'s primary key.
    pub fn delete(&self, old: &Feature) -> Result<Statement, StatementError> {
        let (primary_key, key) = self.key_value(old)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            self.table.quoted(),
            quote_identifier(primary_key)
        );
        let param = match key {
            Value::String(text) => SqlParam::Text(text.clone()),
            Value::Integer(number) => SqlParam::Integer(*number),
            Value::Double(number) if number.is_finite() => SqlParam::Double(*number),
            Value::Date(date) => SqlParam::Timestamp(*date),
            other => return Err(unsupported_key(primary_key, other)),
        };
        Ok(Statement::new(sql, vec![param]))
    }

    fn column(&self, name: &str) -> String {
        if self.normalized_column_names {
            quote_identifier(&name.to_lowercase())
        } else {
            quote_identifier(name)
        }
    }

    fn key_value<'f>(&'f self, feature: &'f Feature) -> Result<(&'f str, &'f Value), StatementError> {
        let primary_key = self.primary_key.as_deref();
        match primary_key.and_then(|name| Some((name, feature.attribute(name)?))) {
            Some((name, value)) if !value.is_null() => Ok((name, value)),
            _ => Err(StatementError::MissingPrimaryKey {
                feature: feature.id(),
                primary_key: self.primary_key.clone(),
            }),
        }
    }

    fn key_literal<'f>(&'f self, feature: &'f Feature) -> Result<(&'f str, String), StatementError> {
        let (primary_key, value) = self.key_value(feature)?;
        let literal = match value {
            Value::String(text) => quote_literal(text),
            Value::Integer(number) => number.to_string(),
            Value::Double(number) if number.is_finite() => number.to_string(),
            Value::Date(date) => quote_literal(&date.to_string()),
            other => return Err(unsupported_key(primary_key, other)),
        };
        Ok((primary_key, literal))
    }

    fn bind(
        &self,
        definition: &AttributeDefinition,
        value: &Value,
    ) -> Result<SqlParam, StatementError> {
        if !value.fits(definition.attribute_type) {
            return Err(StatementError::TypeMismatch {
                attribute: definition.name.clone(),
                expected: definition.attribute_type,
                found: value.kind(),
            });
        }
        let encode = |geometry: &Geometry<f64>, srid: Option<i32>, dimension: Dimension| {
            self.codec
                .encode(geometry, srid, dimension)
                .map(SqlParam::Blob)
                .map_err(|source| StatementError::Codec {
                    attribute: definition.name.clone(),
                    source,
                })
        };
        match value {
            Value::Null => Ok(SqlParam::Null),
            Value::String(text) => Ok(SqlParam::Text(text.clone())),
            Value::Integer(number) => Ok(SqlParam::Integer(*number)),
            Value::Double(number) => Ok(SqlParam::Double(*number)),
            Value::Date(date) => Ok(SqlParam::Timestamp(*date)),
            Value::Geometry(geometry) => encode(geometry, self.srid, self.dimension),
            Value::Object(ObjectValue::Geometry(geometry)) => encode(geometry, None, Dimension::Xy),
            Value::Object(ObjectValue::Text(text)) => Ok(SqlParam::Text(text.clone())),
            Value::Object(ObjectValue::Bytes(bytes)) => Ok(SqlParam::Blob(bytes.clone())),
        }
    }
}

fn unsupported_key(primary_key: &str, value: &Value) -> StatementError {
    StatementError::UnsupportedPrimaryKey {
        primary_key: primary_key.to_owned(),
        found: value.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::EwkbCodec, schema::FeatureSchema};
    use geo::{Geometry, Point};
    use rstest::{fixture, rstest};
    use std::sync::Arc;

    const CODEC: EwkbCodec = EwkbCodec::postgis();

    #[fixture]
    fn schema() -> Arc<FeatureSchema> {
        Arc::new(
            FeatureSchema::new(vec![
                AttributeDefinition::new("id", AttributeType::Integer),
                AttributeDefinition::new("name", AttributeType::String),
                AttributeDefinition::new("geom", AttributeType::Geometry),
            ])
            .and_then(|s| s.with_external_primary_key("id"))
            .expect("valid schema"),
        )
    }

    fn point() -> Value {
        Value::Geometry(Geometry::Point(Point::new(1.0, 2.0)))
    }

    fn feature(schema: &Arc<FeatureSchema>, id: Value, name: Value, geom: Value) -> Feature {
        Feature::new(FeatureId(1), Arc::clone(schema), vec![id, name, geom]).expect("valid")
    }

    fn builder() -> StatementBuilder<'static> {
        StatementBuilder::new(TableName::parse("public.t"), &CODEC).with_primary_key("id")
    }

    #[rstest]
    fn single_changed_attribute_yields_one_update(schema: Arc<FeatureSchema>) {
        let old = feature(&schema, Value::Integer(1), Value::from("A"), point());
        let new = feature(&schema, Value::Integer(1), Value::from("B"), point());
        let statements = builder().updates(&old, &new).expect("builds");
        assert_eq!(
            statements,
            vec![Statement::new(
                r#"UPDATE "public"."t" SET "name" = ? WHERE "id" = 1"#,
                vec![SqlParam::Text("B".into())],
            )]
        );
    }

    #[rstest]
    fn changed_key_is_updated_after_other_columns(schema: Arc<FeatureSchema>) {
        let old = feature(&schema, Value::Integer(1), Value::from("A"), point());
        let new = feature(&schema, Value::Integer(2), Value::from("B"), point());
        let statements = builder().updates(&old, &new).expect("builds");
        assert_eq!(
            statements,
            vec![
                Statement::new(
                    r#"UPDATE "public"."t" SET "name" = ? WHERE "id" = 1"#,
                    vec![SqlParam::Text("B".into())],
                ),
                Statement::new(
                    r#"UPDATE "public"."t" SET "id" = ? WHERE "id" = 1"#,
                    vec![SqlParam::Integer(2)],
                ),
            ]
        );
    }

    #[rstest]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(f64::NEG_INFINITY)]
    fn non_finite_double_keys_are_rejected(#[case] key: f64) {
        let schema = Arc::new(
            FeatureSchema::new(vec![
                AttributeDefinition::new("k", AttributeType::Double),
                AttributeDefinition::new("n", AttributeType::Integer),
                AttributeDefinition::new("geom", AttributeType::Geometry),
            ])
            .expect("valid"),
        );
        let row = |n| {
            Feature::new(
                FeatureId(1),
                Arc::clone(&schema),
                vec![Value::Double(key), Value::Integer(n), Value::Null],
            )
            .expect("valid")
        };
        let builder = StatementBuilder::new(TableName::parse("t"), &CODEC).with_primary_key("k");

        let err = builder.updates(&row(1), &row(2)).expect_err("non-finite key");
        assert!(matches!(
            err,
            StatementError::UnsupportedPrimaryKey { found: "double", .. }
        ));
        let err = builder.delete(&row(1)).expect_err("non-finite key");
        assert!(matches!(err, StatementError::UnsupportedPrimaryKey { .. }));
    }

    #[rstest]
    fn display_summarises_blobs() {
        let statement = Statement::new(
            "INSERT INTO t(a,b,c) VALUES(?,?,?)",
            vec![
                SqlParam::Text("x".into()),
                SqlParam::Null,
                SqlParam::Blob(vec![0; 21]),
            ],
        );
        assert_eq!(
            statement.to_string(),
            r#"INSERT INTO t(a,b,c) VALUES(?,?,?) ["x", NULL, <21 bytes>]"#
        );
    }

    #[rstest]
    fn text_keys_are_quoted_and_escaped() {
        let schema = Arc::new(
            FeatureSchema::new(vec![
                AttributeDefinition::new("code", AttributeType::String),
                AttributeDefinition::new("n", AttributeType::Integer),
                AttributeDefinition::new("geom", AttributeType::Geometry),
            ])
            .expect("valid"),
        );
        let values = |n| vec![Value::from("O'Hare"), Value::Integer(n), Value::Null];
        let old = Feature::new(FeatureId(2), Arc::clone(&schema), values(1)).expect("valid");
        let new = Feature::new(FeatureId(2), schema, values(2)).expect("valid");
        let statements = StatementBuilder::new(TableName::parse("airports"), &CODEC)
            .with_primary_key("code")
            .updates(&old, &new)
            .expect("builds");
        assert_eq!(
            statements[0].sql(),
            r#"UPDATE "airports" SET "n" = ? WHERE "code" = 'O''Hare'"#
        );
    }

    #[rstest]
    fn null_transitions_count_as_changes(schema: Arc<FeatureSchema>) {
        let old = feature(&schema, Value::Integer(3), Value::Null, point());
        let new = feature(&schema, Value::Integer(3), Value::from("x"), Value::Null);
        let statements = builder().updates(&old, &new).expect("builds");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].params(), &[SqlParam::Null]);
    }

    #[rstest]
    fn unchanged_modification_yields_nothing(schema: Arc<FeatureSchema>) {
        let same = feature(&schema, Value::Integer(1), Value::from("A"), point());
        assert!(builder().updates(&same, &same).expect("builds").is_empty());
    }

    #[rstest]
    fn insert_skips_primary_key_and_encodes_geometry(schema: Arc<FeatureSchema>) {
        let new = feature(&schema, Value::Null, Value::from("A"), point());
        let statement = builder()
            .with_srid(Some(2154))
            .insert(&new)
            .expect("builds");
        assert_eq!(
            statement.sql(),
            r#"INSERT INTO "public"."t"("name","geom") VALUES(?,?)"#
        );
        let SqlParam::Blob(bytes) = &statement.params()[1] else {
            panic!("geometry should bind as a blob");
        };
        let decoded = CODEC.decode(bytes).expect("decodes");
        assert_eq!(decoded.srid, Some(2154));
    }

    #[rstest]
    fn normalized_names_are_lower_cased() {
        let schema = Arc::new(
            FeatureSchema::new(vec![
                AttributeDefinition::new("Name", AttributeType::String),
                AttributeDefinition::new("GEOM", AttributeType::Geometry),
            ])
            .expect("valid"),
        );
        let new = Feature::new(FeatureId(1), schema, vec![Value::from("a"), Value::Null])
            .expect("valid");
        let statement = builder()
            .with_normalized_column_names(true)
            .insert(&new)
            .expect("builds");
        assert_eq!(
            statement.sql(),
            r#"INSERT INTO "public"."t"("name","geom") VALUES(?,?)"#
        );
    }

    #[rstest]
    fn object_geometries_are_flat_and_untagged() {
        let schema = Arc::new(
            FeatureSchema::new(vec![
                AttributeDefinition::new("extra", AttributeType::Object),
                AttributeDefinition::new("geom", AttributeType::Geometry),
            ])
            .expect("valid"),
        );
        let extra = Value::Object(ObjectValue::Geometry(Geometry::Point(Point::new(3.0, 4.0))));
        let new = Feature::new(FeatureId(1), schema, vec![extra, Value::Null]).expect("valid");
        let statement = builder()
            .with_srid(Some(4326))
            .with_dimension(Dimension::Xyz)
            .insert(&new)
            .expect("builds");
        let SqlParam::Blob(bytes) = &statement.params()[0] else {
            panic!("object geometry should bind as a blob");
        };
        let decoded = CODEC.decode(bytes).expect("decodes");
        assert_eq!(decoded.srid, None);
        assert_eq!(decoded.dimension, Dimension::Xy);
    }

    #[rstest]
    fn mismatched_value_fails_before_sql(schema: Arc<FeatureSchema>) {
        let new = feature(&schema, Value::Null, Value::Integer(9), point());
        let err = builder().insert(&new).expect_err("type mismatch");
        assert!(matches!(
            err,
            StatementError::TypeMismatch {
                expected: AttributeType::String,
                found: "integer",
                ..
            }
        ));
    }

    #[rstest]
    fn delete_requires_a_non_null_key(schema: Arc<FeatureSchema>) {
        let old = feature(&schema, Value::Null, Value::from("A"), point());
        let err = builder().delete(&old).expect_err("no key");
        assert!(matches!(err, StatementError::MissingPrimaryKey { .. }));
    }

    #[rstest]
    fn missing_key_attribute_is_reported() {
        let schema = Arc::new(
            FeatureSchema::new(vec![AttributeDefinition::new("geom", AttributeType::Geometry)])
                .expect("valid"),
        );
        let old = Feature::empty(FeatureId(4), schema);
        let err = builder()
            .for_evolution(&Evolution::suppression(old))
            .expect_err("no key column");
        assert!(matches!(
            err,
            StatementError::MissingPrimaryKey { feature: FeatureId(4), .. }
        ));
    }

    #[rstest]
    fn keyless_builder_inserts_every_column_but_cannot_update(schema: Arc<FeatureSchema>) {
        let keyless = StatementBuilder::new(TableName::parse("t"), &CODEC);
        let row = feature(&schema, Value::Integer(1), Value::from("A"), point());
        let insert = keyless.insert(&row).expect("builds");
        assert_eq!(insert.sql(), r#"INSERT INTO "t"("id","name","geom") VALUES(?,?,?)"#);

        let renamed = feature(&schema, Value::Integer(1), Value::from("B"), point());
        let err = keyless.updates(&row, &renamed).expect_err("no key configured");
        assert!(matches!(
            err,
            StatementError::MissingPrimaryKey { primary_key: None, .. }
        ));
    }
}
