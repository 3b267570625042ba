//! Storage port used by the committer and the read path.
//!
//! A [`SpatialConnection`] exposes the handful of operations a write-back
//! session needs: transaction control, statement execution, table
//! maintenance and feature loading. Backends are chosen at runtime through a
//! [`ConnectionDescriptor`].

use std::{fmt, path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::{
    codec::{CodecError, Dimension},
    feature::{Feature, FeatureError},
    filter::{FilterError, FilterQuery},
    schema::{AttributeType, FeatureSchema, SchemaError},
    statement::Statement,
    table::TableName,
};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::{LAYER_REGISTRY_TABLE, SqliteConnection};

/// Boxed error returned by a backend driver.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Opening the store failed.
    #[error("failed to open {location}")]
    Open {
        /// Human readable location of the store.
        location: String,
        /// Driver error.
        #[source]
        source: BackendError,
    },
    /// A backend operation failed.
    #[error("storage operation `{step}` failed")]
    Backend {
        /// Operation that failed.
        step: &'static str,
        /// Driver error.
        #[source]
        source: BackendError,
    },
    /// A stored geometry could not be decoded.
    #[error("failed to decode geometry column `{column}` of {table}")]
    Decode {
        /// Table read.
        table: String,
        /// Column read.
        column: String,
        /// Codec failure.
        #[source]
        source: CodecError,
    },
    /// The table does not exist.
    #[error("table {table} does not exist")]
    UnknownTable {
        /// Table looked up.
        table: String,
    },
    /// The backend was not compiled in.
    #[error("the {backend} backend is not available in this build")]
    UnsupportedBackend {
        /// Backend name.
        backend: &'static str,
    },
    /// The filter query could not be rendered.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// A described table did not form a valid schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A loaded row did not fit its schema.
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// One column of a table to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name as written to the store.
    pub name: String,
    /// Declared type.
    pub attribute_type: AttributeType,
}

/// Layout of a table to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Target table.
    pub table: TableName,
    /// Columns in schema order, geometry included.
    pub columns: Vec<ColumnSpec>,
    /// Name of the geometry column.
    pub geometry_column: String,
    /// SRID registered for the geometry column.
    pub srid: Option<i32>,
    /// Dimension registered for the geometry column.
    pub dimension: Dimension,
    /// Column declared as primary key, if any.
    pub primary_key: Option<String>,
}

impl TableSpec {
    /// Layout mirroring `schema`, lower-casing column names when `normalized`.
    ///
    /// ```
    /// use geosync_core::{
    ///     AttributeDefinition, AttributeType, Dimension, FeatureSchema, TableName, TableSpec,
    /// };
    ///
    /// # fn main() -> Result<(), geosync_core::SchemaError> {
    /// let schema = FeatureSchema::new(vec![
    ///     AttributeDefinition::new("Name", AttributeType::String),
    ///     AttributeDefinition::new("GEOM", AttributeType::Geometry),
    /// ])?;
    /// let spec = TableSpec::from_schema(TableName::parse("roads"), &schema, None, Dimension::Xy, true);
    /// assert_eq!(spec.geometry_column, "geom");
    /// assert_eq!(spec.columns[0].name, "name");
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_schema(
        table: TableName,
        schema: &FeatureSchema,
        srid: Option<i32>,
        dimension: Dimension,
        normalized: bool,
    ) -> Self {
        let column_name = |name: &str| {
            if normalized {
                name.to_lowercase()
            } else {
                name.to_owned()
            }
        };
        let columns = schema
            .attributes()
            .iter()
            .map(|definition| ColumnSpec {
                name: column_name(&definition.name),
                attribute_type: definition.attribute_type,
            })
            .collect();
        let primary_key = schema
            .external_primary_key_index()
            .and_then(|index| schema.attribute(index))
            .map(|definition| column_name(&definition.name));
        Self {
            table,
            columns,
            geometry_column: column_name(schema.geometry_name()),
            srid,
            dimension,
            primary_key,
        }
    }
}

/// Connection to a spatial store.
///
/// Methods take `&mut self` because every backend keeps per-connection
/// transaction state.
pub trait SpatialConnection {
    /// Whether each statement commits on its own.
    fn is_autocommit(&self) -> bool;

    /// Switch between autocommit and explicit transactions.
    ///
    /// Re-enabling autocommit discards work that was not committed.
    fn set_autocommit(&mut self, enabled: bool) -> Result<(), StorageError>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Run `statement`, returning the number of affected rows.
    fn execute(&mut self, statement: &Statement) -> Result<usize, StorageError>;

    /// Whether `table` exists.
    fn table_exists(&mut self, table: &TableName) -> Result<bool, StorageError>;

    /// Column names of `table`, in table order.
    fn table_columns(&mut self, table: &TableName) -> Result<Vec<String>, StorageError>;

    /// Schema of `table`, including its geometry column and primary key.
    fn describe_table(&mut self, table: &TableName) -> Result<FeatureSchema, StorageError>;

    /// Drop `table` and unregister its geometry column.
    fn drop_table(&mut self, table: &TableName) -> Result<(), StorageError>;

    /// Create and register a table.
    fn create_table(&mut self, spec: &TableSpec) -> Result<(), StorageError>;

    /// Add a generated integer key named `column` to `table`, populating
    /// existing rows.
    fn add_primary_key(&mut self, table: &TableName, column: &str) -> Result<(), StorageError>;

    /// Every row of `table` as features of `schema`, in storage order.
    ///
    /// Feature identifiers are numbered from one in the order rows are read.
    fn load_features(
        &mut self,
        table: &TableName,
        schema: &Arc<FeatureSchema>,
    ) -> Result<Vec<Feature>, StorageError>;

    /// Rows matching `query`, read as features of `schema`.
    fn query(
        &mut self,
        query: &FilterQuery,
        schema: &Arc<FeatureSchema>,
    ) -> Result<Vec<Feature>, StorageError>;

    /// Maintenance run after a write attempt, such as refreshing planner
    /// statistics.
    fn finalize_update(&mut self, table: &TableName) -> Result<(), StorageError>;
}

/// Which store to open.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "kebab-case")
)]
pub enum Backend {
    /// SQLite database file, created when missing.
    Sqlite {
        /// Database location.
        path: PathBuf,
    },
    /// Private in-memory SQLite database.
    SqliteInMemory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite { path } => write!(f, "SQLite database {}", path.display()),
            Self::SqliteInMemory => f.write_str("in-memory SQLite database"),
        }
    }
}

/// Parameters needed to open a [`SpatialConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionDescriptor {
    /// Selected backend.
    pub backend: Backend,
}

impl ConnectionDescriptor {
    /// Descriptor for `backend`.
    pub const fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

/// Open the store described by `descriptor`.
///
/// # Examples
///
/// ```
/// use geosync_core::{Backend, ConnectionDescriptor, TableName, open_connection};
///
/// # fn main() -> Result<(), geosync_core::StorageError> {
/// let mut connection = open_connection(&ConnectionDescriptor::new(Backend::SqliteInMemory))?;
/// assert!(connection.is_autocommit());
/// assert!(!connection.table_exists(&TableName::parse("roads"))?);
/// # Ok(())
/// # }
/// ```
pub fn open_connection(
    descriptor: &ConnectionDescriptor,
) -> Result<Box<dyn SpatialConnection>, StorageError> {
    match &descriptor.backend {
        #[cfg(feature = "store-sqlite")]
        Backend::Sqlite { path } => Ok(Box::new(SqliteConnection::open(path)?)),
        #[cfg(feature = "store-sqlite")]
        Backend::SqliteInMemory => Ok(Box::new(SqliteConnection::open_in_memory()?)),
        #[cfg(not(feature = "store-sqlite"))]
        Backend::Sqlite { .. } | Backend::SqliteInMemory => {
            Err(StorageError::UnsupportedBackend { backend: "sqlite" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeDefinition;
    use rstest::rstest;

    #[rstest]
    fn table_spec_keeps_declared_key_and_order() {
        let schema = FeatureSchema::new(vec![
            AttributeDefinition::new("gid", AttributeType::Integer),
            AttributeDefinition::new("geom", AttributeType::Geometry),
        ])
        .and_then(|s| s.with_external_primary_key("gid"))
        .expect("valid");
        let spec = TableSpec::from_schema(
            TableName::parse("main.roads"),
            &schema,
            Some(4326),
            Dimension::Xyz,
            false,
        );
        assert_eq!(spec.primary_key.as_deref(), Some("gid"));
        assert_eq!(spec.geometry_column, "geom");
        let names: Vec<_> = spec.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["gid", "geom"]);
    }

    #[cfg(feature = "serde")]
    #[rstest]
    #[case(r#"{"backend":{"kind":"sqlite-in-memory"}}"#, Backend::SqliteInMemory)]
    #[case(
        r#"{"backend":{"kind":"sqlite","path":"/tmp/layers.db"}}"#,
        Backend::Sqlite { path: PathBuf::from("/tmp/layers.db") }
    )]
    fn descriptors_deserialize_from_tagged_json(#[case] json: &str, #[case] backend: Backend) {
        let descriptor: ConnectionDescriptor = serde_json::from_str(json).expect("valid json");
        assert_eq!(descriptor, ConnectionDescriptor::new(backend));
    }
}
