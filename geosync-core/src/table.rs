//! Dataset naming and SQL identifier quoting.

use std::fmt;

/// Double-quote an identifier, doubling embedded quotes.
///
/// ```
/// use geosync_core::quote_identifier;
///
/// assert_eq!(quote_identifier("Roads"), r#""Roads""#);
/// assert_eq!(quote_identifier(r#"a"b"#), r#""a""b""#);
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Single-quote a text literal, doubling embedded quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// A possibly schema-qualified table name.
///
/// Dataset names of the form `schema.table` are split at the first dot so
/// both parts are quoted as separate identifiers.
///
/// # Examples
///
/// ```
/// use geosync_core::TableName;
///
/// let table = TableName::parse("public.roads");
/// assert_eq!(table.schema(), Some("public"));
/// assert_eq!(table.table(), "roads");
/// assert_eq!(table.quoted(), r#""public"."roads""#);
/// assert_eq!(TableName::parse("roads").quoted(), r#""roads""#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableName {
    schema: Option<String>,
    table: String,
}

impl TableName {
    /// Build from explicit parts; an empty schema counts as none.
    pub fn new(schema: Option<&str>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.filter(|s| !s.is_empty()).map(str::to_owned),
            table: table.into(),
        }
    }

    /// Split a dataset name into schema and table.
    pub fn parse(dataset: &str) -> Self {
        match dataset.split_once('.') {
            Some((schema, table)) => Self::new(Some(schema), table),
            None => Self::new(None, dataset),
        }
    }

    /// Unquoted schema name, if any.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Unquoted table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Quoted `"schema"."table"`, or `"table"` without a schema.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{}.{}",
                quote_identifier(schema),
                quote_identifier(&self.table)
            ),
            None => quote_identifier(&self.table),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => f.write_str(&self.table),
        }
    }
}
