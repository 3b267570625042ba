//! Compare an in-memory schema with the columns of a live table.

use std::collections::HashSet;

use crate::schema::FeatureSchema;

/// Outcome of [`check`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCompatibility {
    /// In-memory attributes found among the live columns.
    pub matched: Vec<String>,
    /// In-memory attributes the live table lacks.
    pub missing: Vec<String>,
}

impl SchemaCompatibility {
    /// Whether some in-memory attributes would not be written.
    pub fn is_degraded(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Match the attributes of `schema` against `live_columns`.
///
/// With `normalized` set, attribute names are lower-cased before comparison,
/// mirroring how they were written when the table was created. Reported names
/// keep their in-memory spelling.
///
/// # Examples
///
/// ```
/// use geosync_core::{AttributeDefinition, AttributeType, FeatureSchema, compat};
///
/// # fn main() -> Result<(), geosync_core::SchemaError> {
/// let schema = FeatureSchema::new(vec![
///     AttributeDefinition::new("Name", AttributeType::String),
///     AttributeDefinition::new("geom", AttributeType::Geometry),
/// ])?;
/// let live = ["name".to_owned(), "geom".to_owned()];
///
/// assert!(compat::check(&live, &schema, false).is_degraded());
/// assert!(!compat::check(&live, &schema, true).is_degraded());
/// # Ok(())
/// # }
/// ```
pub fn check(live_columns: &[String], schema: &FeatureSchema, normalized: bool) -> SchemaCompatibility {
    let live: HashSet<&str> = live_columns.iter().map(String::as_str).collect();
    let mut compatibility = SchemaCompatibility::default();
    for name in schema.names() {
        let found = if normalized {
            live.contains(name.to_lowercase().as_str())
        } else {
            live.contains(name)
        };
        if found {
            compatibility.matched.push(name.to_owned());
        } else {
            compatibility.missing.push(name.to_owned());
        }
    }
    compatibility
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDefinition, AttributeType};
    use rstest::{fixture, rstest};

    #[fixture]
    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            AttributeDefinition::new("gid", AttributeType::Integer),
            AttributeDefinition::new("Label", AttributeType::String),
            AttributeDefinition::new("geom", AttributeType::Geometry),
        ])
        .expect("valid schema")
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[rstest]
    #[case(&["gid", "Label", "geom"], false, &[])]
    #[case(&["gid", "label", "geom"], false, &["Label"])]
    #[case(&["gid", "label", "geom"], true, &[])]
    #[case(&["gid", "Label"], true, &["Label", "geom"])]
    fn reports_missing_columns(
        schema: FeatureSchema,
        #[case] live: &[&str],
        #[case] normalized: bool,
        #[case] missing: &[&str],
    ) {
        let result = check(&columns(live), &schema, normalized);
        assert_eq!(result.missing, columns(missing));
        assert_eq!(result.matched.len() + result.missing.len(), schema.len());
        assert_eq!(result.is_degraded(), !missing.is_empty());
    }

    #[rstest]
    fn extra_live_columns_are_ignored(schema: FeatureSchema) {
        let live = columns(&["gid", "Label", "geom", "updated_at"]);
        let result = check(&live, &schema, false);
        assert_eq!(result.matched, columns(&["gid", "Label", "geom"]));
        assert!(!result.is_degraded());
    }
}
