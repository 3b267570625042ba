//! Attribute layout shared by every feature of a dataset.

use std::fmt;

use thiserror::Error;

/// Declared type of a feature attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum AttributeType {
    /// Free text.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Double precision float.
    Double,
    /// Timestamp without time zone.
    Date,
    /// The dataset's main geometry.
    Geometry,
    /// Opaque value: a secondary geometry, text or raw bytes.
    Object,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Double => "DOUBLE",
            Self::Date => "DATE",
            Self::Geometry => "GEOMETRY",
            Self::Object => "OBJECT",
        };
        f.write_str(name)
    }
}

/// A named, typed attribute slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeDefinition {
    /// Column name, unquoted.
    pub name: String,
    /// Declared type.
    pub attribute_type: AttributeType,
}

impl AttributeDefinition {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// Errors raised while building or altering a [`FeatureSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two attributes share a name.
    #[error("attribute {name:?} is declared more than once")]
    DuplicateAttribute {
        /// The repeated name.
        name: String,
    },
    /// No attribute is typed as GEOMETRY.
    #[error("schema must declare exactly one GEOMETRY attribute, found {found}")]
    GeometryAttributeCount {
        /// Number of GEOMETRY attributes present.
        found: usize,
    },
    /// A referenced attribute does not exist.
    #[error("schema has no attribute named {name:?}")]
    UnknownAttribute {
        /// The missing name.
        name: String,
    },
}

/// Ordered attribute definitions with the primary key and geometry markers.
///
/// # Examples
///
/// ```
/// use geosync_core::{AttributeDefinition, AttributeType, FeatureSchema};
///
/// # fn main() -> Result<(), geosync_core::SchemaError> {
/// let schema = FeatureSchema::new(vec![
///     AttributeDefinition::new("id", AttributeType::Integer),
///     AttributeDefinition::new("geom", AttributeType::Geometry),
/// ])?
/// .with_external_primary_key("id")?;
/// assert_eq!(schema.external_primary_key_index(), Some(0));
/// assert_eq!(schema.geometry_index(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    attributes: Vec<AttributeDefinition>,
    geometry_index: usize,
    primary_key_index: Option<usize>,
}

impl FeatureSchema {
    /// Validate attribute names and locate the geometry attribute.
    pub fn new(attributes: Vec<AttributeDefinition>) -> Result<Self, SchemaError> {
        for (position, attribute) in attributes.iter().enumerate() {
            let repeated = attributes
                .iter()
                .skip(position + 1)
                .any(|other| other.name == attribute.name);
            if repeated {
                return Err(SchemaError::DuplicateAttribute {
                    name: attribute.name.clone(),
                });
            }
        }

        let geometries: Vec<usize> = attributes
            .iter()
            .enumerate()
            .filter(|(_, attribute)| attribute.attribute_type == AttributeType::Geometry)
            .map(|(index, _)| index)
            .collect();
        let [geometry_index] = geometries.as_slice() else {
            return Err(SchemaError::GeometryAttributeCount {
                found: geometries.len(),
            });
        };

        Ok(Self {
            geometry_index: *geometry_index,
            attributes,
            primary_key_index: None,
        })
    }

    /// Return a copy flagging `name` as the external primary key.
    pub fn with_external_primary_key(mut self, name: &str) -> Result<Self, SchemaError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| SchemaError::UnknownAttribute { name: name.into() })?;
        self.primary_key_index = Some(index);
        Ok(self)
    }

    /// Return a copy with the primary key marker stripped.
    ///
    /// The attribute itself stays in the schema as an ordinary column.
    #[must_use]
    pub fn remove_external_primary_key(mut self) -> Self {
        self.primary_key_index = None;
        self
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the schema declares no attributes. Never true for a validated
    /// schema, provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attribute definitions in declaration order.
    pub fn attributes(&self) -> &[AttributeDefinition] {
        &self.attributes
    }

    /// Attribute at `index`, if any.
    pub fn attribute(&self, index: usize) -> Option<&AttributeDefinition> {
        self.attributes.get(index)
    }

    /// Position of the attribute called `name` (exact match).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Whether an attribute called `name` exists.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Position of the geometry attribute.
    pub fn geometry_index(&self) -> usize {
        self.geometry_index
    }

    /// Name of the geometry attribute.
    pub fn geometry_name(&self) -> &str {
        self.attributes
            .get(self.geometry_index)
            .map_or("", |a| a.name.as_str())
    }

    /// Position of the external primary key, when one is flagged.
    pub fn external_primary_key_index(&self) -> Option<usize> {
        self.primary_key_index
    }

    /// Iterate over attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.attributes.iter().map(|a| a.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn attr(name: &str, attribute_type: AttributeType) -> AttributeDefinition {
        AttributeDefinition::new(name, attribute_type)
    }

    #[rstest]
    fn rejects_duplicate_names() {
        let err = FeatureSchema::new(vec![
            attr("name", AttributeType::String),
            attr("geom", AttributeType::Geometry),
            attr("name", AttributeType::Integer),
        ])
        .expect_err("duplicate should fail");
        assert_eq!(
            err,
            SchemaError::DuplicateAttribute {
                name: "name".into()
            }
        );
    }

    #[rstest]
    #[case(vec![attr("id", AttributeType::Integer)], 0)]
    #[case(vec![attr("a", AttributeType::Geometry), attr("b", AttributeType::Geometry)], 2)]
    fn requires_single_geometry(#[case] attributes: Vec<AttributeDefinition>, #[case] found: usize) {
        let err = FeatureSchema::new(attributes).expect_err("geometry count should fail");
        assert_eq!(err, SchemaError::GeometryAttributeCount { found });
    }

    #[rstest]
    fn names_are_case_sensitive() {
        let schema = FeatureSchema::new(vec![
            attr("Name", AttributeType::String),
            attr("name", AttributeType::String),
            attr("geom", AttributeType::Geometry),
        ])
        .expect("distinct names");
        assert_eq!(schema.index_of("name"), Some(1));
    }

    #[rstest]
    fn primary_key_marker_can_be_stripped() {
        let schema = FeatureSchema::new(vec![
            attr("gid", AttributeType::Integer),
            attr("geom", AttributeType::Geometry),
        ])
        .and_then(|s| s.with_external_primary_key("gid"))
        .expect("valid schema");
        assert_eq!(schema.external_primary_key_index(), Some(0));
        let stripped = schema.remove_external_primary_key();
        assert_eq!(stripped.external_primary_key_index(), None);
        assert!(stripped.has_attribute("gid"));
    }

    #[rstest]
    fn unknown_primary_key_is_rejected() {
        let err = FeatureSchema::new(vec![attr("geom", AttributeType::Geometry)])
            .and_then(|s| s.with_external_primary_key("id"))
            .expect_err("unknown key");
        assert!(matches!(err, SchemaError::UnknownAttribute { .. }));
    }
}
