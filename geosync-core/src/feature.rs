//! Features, their attribute values and the collection they belong to.

use std::{fmt, sync::Arc};

use chrono::NaiveDateTime;
use geo::Geometry;
use thiserror::Error;

use crate::schema::{AttributeType, FeatureSchema};

/// Session-local feature identifier.
///
/// Identifiers are stable for one editing session and unrelated to the
/// database primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload of an OBJECT-typed attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectValue {
    /// A secondary geometry, written in two dimensions without an SRID tag.
    Geometry(Geometry<f64>),
    /// Arbitrary text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value; binds as SQL NULL whatever the declared type.
    Null,
    /// STRING payload.
    String(String),
    /// INTEGER payload.
    Integer(i64),
    /// DOUBLE payload.
    Double(f64),
    /// DATE payload.
    Date(NaiveDateTime),
    /// GEOMETRY payload.
    Geometry(Geometry<f64>),
    /// OBJECT payload.
    Object(ObjectValue),
}

impl Value {
    /// Whether the value is [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value may be stored in an attribute of `attribute_type`.
    pub const fn fits(&self, attribute_type: AttributeType) -> bool {
        matches!(
            (self, attribute_type),
            (Self::Null, _)
                | (Self::String(_), AttributeType::String)
                | (Self::Integer(_), AttributeType::Integer)
                | (Self::Double(_), AttributeType::Double)
                | (Self::Date(_), AttributeType::Date)
                | (Self::Geometry(_), AttributeType::Geometry)
                | (Self::Object(_), AttributeType::Object)
        )
    }

    /// Short name of the variant, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::Date(_) => "date",
            Self::Geometry(_) => "geometry",
            Self::Object(_) => "object",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Date(value)
    }
}

impl From<Geometry<f64>> for Value {
    fn from(value: Geometry<f64>) -> Self {
        Self::Geometry(value)
    }
}

/// Errors returned by [`Feature::new`] and attribute setters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// The number of values does not match the schema.
    #[error("feature {id} has {found} values but its schema declares {expected}")]
    ArityMismatch {
        /// Feature being built.
        id: FeatureId,
        /// Attribute count of the schema.
        expected: usize,
        /// Values supplied.
        found: usize,
    },
    /// The named attribute does not exist.
    #[error("feature {id} has no attribute {name:?}")]
    UnknownAttribute {
        /// Feature being edited.
        id: FeatureId,
        /// Requested attribute name.
        name: String,
    },
}

/// One row of a dataset: an identifier, its schema and positional values.
///
/// Cloning a feature copies its values, so a snapshot held by an evolution is
/// never affected by later edits to the editor's copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: FeatureId,
    schema: Arc<FeatureSchema>,
    values: Vec<Value>,
}

impl Feature {
    /// Build a feature whose value count matches its schema.
    pub fn new(
        id: FeatureId,
        schema: Arc<FeatureSchema>,
        values: Vec<Value>,
    ) -> Result<Self, FeatureError> {
        if values.len() != schema.len() {
            return Err(FeatureError::ArityMismatch {
                id,
                expected: schema.len(),
                found: values.len(),
            });
        }
        Ok(Self { id, schema, values })
    }

    /// A feature with every attribute set to null.
    pub fn empty(id: FeatureId, schema: Arc<FeatureSchema>) -> Self {
        let values = vec![Value::Null; schema.len()];
        Self { id, schema, values }
    }

    /// Session identifier.
    pub const fn id(&self) -> FeatureId {
        self.id
    }

    /// Shared schema.
    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    /// All values in schema order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at `index`; out-of-range indices read as null.
    pub fn value(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&Value::Null)
    }

    /// Value of the attribute called `name`.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    /// The geometry value.
    pub fn geometry(&self) -> &Value {
        self.value(self.schema.geometry_index())
    }

    /// Replace the value of the attribute called `name`.
    pub fn set_attribute(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), FeatureError> {
        let slot = self
            .schema
            .index_of(name)
            .and_then(|i| self.values.get_mut(i))
            .ok_or_else(|| FeatureError::UnknownAttribute {
                id: self.id,
                name: name.to_owned(),
            })?;
        *slot = value.into();
        Ok(())
    }

    /// Rebind the feature to `schema`, keeping values positionally.
    pub(crate) fn rebind(&mut self, schema: Arc<FeatureSchema>) {
        self.schema = schema;
    }
}

/// A schema and the features loaded for or created in one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    schema: Arc<FeatureSchema>,
    features: Vec<Feature>,
}

impl FeatureCollection {
    /// An empty collection.
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self {
            schema,
            features: Vec::new(),
        }
    }

    /// A collection holding `features`, all of which should share `schema`.
    pub fn with_features(schema: Arc<FeatureSchema>, features: Vec<Feature>) -> Self {
        Self { schema, features }
    }

    /// Shared schema.
    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    /// Features in load order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Append a feature.
    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the collection holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Replace the schema and rebind every feature to it.
    pub fn replace_schema(&mut self, schema: FeatureSchema) {
        let schema = Arc::new(schema);
        for feature in &mut self.features {
            feature.rebind(Arc::clone(&schema));
        }
        self.schema = schema;
    }

    /// Replace the features, keeping the schema.
    pub fn replace_features(&mut self, features: Vec<Feature>) {
        self.features = features;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeDefinition;
    use geo::{Geometry, Point};
    use rstest::{fixture, rstest};

    #[fixture]
    fn schema() -> Arc<FeatureSchema> {
        Arc::new(
            FeatureSchema::new(vec![
                AttributeDefinition::new("id", AttributeType::Integer),
                AttributeDefinition::new("name", AttributeType::String),
                AttributeDefinition::new("geom", AttributeType::Geometry),
            ])
            .expect("valid schema"),
        )
    }

    #[rstest]
    fn rejects_wrong_arity(schema: Arc<FeatureSchema>) {
        let err = Feature::new(FeatureId(1), schema, vec![Value::Null]).expect_err("arity");
        assert!(matches!(
            err,
            FeatureError::ArityMismatch {
                expected: 3,
                found: 1,
                ..
            }
        ));
    }

    #[rstest]
    fn clones_are_independent(schema: Arc<FeatureSchema>) {
        let mut feature = Feature::empty(FeatureId(7), schema);
        feature.set_attribute("name", "before").expect("set name");
        let snapshot = feature.clone();
        feature.set_attribute("name", "after").expect("set name");
        assert_eq!(snapshot.attribute("name"), Some(&Value::from("before")));
        assert_eq!(feature.attribute("name"), Some(&Value::from("after")));
    }

    #[rstest]
    #[case(Value::Null, AttributeType::Date, true)]
    #[case(Value::Integer(1), AttributeType::Integer, true)]
    #[case(Value::Integer(1), AttributeType::Double, false)]
    #[case(Value::Geometry(Geometry::Point(Point::new(0.0, 0.0))), AttributeType::Object, false)]
    #[case(Value::Object(ObjectValue::Text("x".into())), AttributeType::Object, true)]
    fn value_fits_declared_type(
        #[case] value: Value,
        #[case] attribute_type: AttributeType,
        #[case] expected: bool,
    ) {
        assert_eq!(value.fits(attribute_type), expected);
    }

    #[rstest]
    fn replacing_schema_rebinds_features(schema: Arc<FeatureSchema>) {
        let feature = Feature::empty(FeatureId(1), Arc::clone(&schema));
        let mut collection = FeatureCollection::with_features(schema, vec![feature]);
        let keyed = collection
            .schema()
            .as_ref()
            .clone()
            .with_external_primary_key("id")
            .expect("key exists");
        collection.replace_schema(keyed);
        let rebound = collection.features().first().expect("one feature");
        assert_eq!(rebound.schema().external_primary_key_index(), Some(0));
        assert!(Arc::ptr_eq(rebound.schema(), collection.schema()));
    }
}
