//! In-memory `SpatialConnection` that records every call, used by unit and
//! behaviour tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    feature::Feature,
    filter::FilterQuery,
    schema::{AttributeDefinition, AttributeType, FeatureSchema},
    statement::Statement,
    store::{SpatialConnection, StorageError, TableSpec},
    table::TableName,
};

/// A call that changed connection or store state.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Autocommit switched to the given mode.
    SetAutocommit(bool),
    /// Transaction committed.
    Commit,
    /// Statement executed.
    Execute(Statement),
    /// Table dropped.
    DropTable(String),
    /// Table created.
    CreateTable(TableSpec),
    /// Generated key added.
    AddPrimaryKey {
        /// Table altered.
        table: String,
        /// Key column.
        column: String,
    },
    /// Maintenance hook run.
    FinalizeUpdate(String),
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `set_autocommit(false)`.
    DisableAutocommit,
    /// `set_autocommit(true)`.
    EnableAutocommit,
    /// `commit`.
    Commit,
    /// `execute`.
    Execute,
    /// `table_exists`.
    TableExists,
    /// `table_columns` and `describe_table`.
    DescribeTable,
    /// `drop_table`.
    DropTable,
    /// `create_table`.
    CreateTable,
    /// `add_primary_key`.
    AddPrimaryKey,
    /// `finalize_update`.
    FinalizeUpdate,
}

/// Recording test double for [`SpatialConnection`].
///
/// Tables are tracked by schema only; loading and querying return no rows.
///
/// ```
/// use geosync_core::{SpatialConnection, test_support::{ConnectionEvent, RecordingConnection}};
///
/// # fn main() -> Result<(), geosync_core::StorageError> {
/// let mut connection = RecordingConnection::new();
/// connection.set_autocommit(false)?;
/// connection.commit()?;
/// assert_eq!(
///     connection.events(),
///     &[ConnectionEvent::SetAutocommit(false), ConnectionEvent::Commit]
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RecordingConnection {
    autocommit: bool,
    tables: HashMap<String, FeatureSchema>,
    events: Vec<ConnectionEvent>,
    failures: HashSet<Operation>,
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingConnection {
    /// A connection in autocommit mode with no tables.
    pub fn new() -> Self {
        Self {
            autocommit: true,
            tables: HashMap::new(),
            events: Vec::new(),
            failures: HashSet::new(),
        }
    }

    /// Add an existing table described by `schema`.
    #[must_use]
    pub fn with_table(mut self, dataset: &str, schema: FeatureSchema) -> Self {
        self.tables
            .insert(TableName::parse(dataset).to_string(), schema);
        self
    }

    /// Make every later call to `operation` fail.
    #[must_use]
    pub fn failing_on(mut self, operation: Operation) -> Self {
        self.fail_on(operation);
        self
    }

    /// Make every later call to `operation` fail.
    pub fn fail_on(&mut self, operation: Operation) {
        self.failures.insert(operation);
    }

    /// Recorded calls, oldest first.
    pub fn events(&self) -> &[ConnectionEvent] {
        &self.events
    }

    /// Executed statements, oldest first.
    pub fn statements(&self) -> Vec<&Statement> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ConnectionEvent::Execute(statement) => Some(statement),
                _ => None,
            })
            .collect()
    }

    /// Autocommit modes set, oldest first.
    pub fn autocommit_transitions(&self) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ConnectionEvent::SetAutocommit(enabled) => Some(*enabled),
                _ => None,
            })
            .collect()
    }

    /// Number of maintenance hook runs.
    pub fn finalize_calls(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, ConnectionEvent::FinalizeUpdate(_)))
            .count()
    }

    /// Number of calls that changed stored data or table layout.
    pub fn mutations(&self) -> usize {
        self.events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    ConnectionEvent::Execute(_)
                        | ConnectionEvent::DropTable(_)
                        | ConnectionEvent::CreateTable(_)
                        | ConnectionEvent::AddPrimaryKey { .. }
                        | ConnectionEvent::Commit
                )
            })
            .count()
    }

    /// Schema of a known table.
    pub fn table(&self, dataset: &str) -> Option<&FeatureSchema> {
        self.tables.get(&TableName::parse(dataset).to_string())
    }

    fn check(&self, operation: Operation) -> Result<(), StorageError> {
        if self.failures.contains(&operation) {
            return Err(StorageError::Backend {
                step: "injected failure",
                source: format!("{operation:?} was set to fail").into(),
            });
        }
        Ok(())
    }

    fn known(&self, table: &TableName) -> Result<&FeatureSchema, StorageError> {
        self.tables
            .get(&table.to_string())
            .ok_or_else(|| StorageError::UnknownTable {
                table: table.to_string(),
            })
    }
}

impl SpatialConnection for RecordingConnection {
    fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), StorageError> {
        self.check(if enabled {
            Operation::EnableAutocommit
        } else {
            Operation::DisableAutocommit
        })?;
        self.autocommit = enabled;
        self.events.push(ConnectionEvent::SetAutocommit(enabled));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.check(Operation::Commit)?;
        self.events.push(ConnectionEvent::Commit);
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Result<usize, StorageError> {
        self.check(Operation::Execute)?;
        self.events.push(ConnectionEvent::Execute(statement.clone()));
        Ok(1)
    }

    fn table_exists(&mut self, table: &TableName) -> Result<bool, StorageError> {
        self.check(Operation::TableExists)?;
        Ok(self.tables.contains_key(&table.to_string()))
    }

    fn table_columns(&mut self, table: &TableName) -> Result<Vec<String>, StorageError> {
        self.check(Operation::DescribeTable)?;
        Ok(self.known(table)?.names().map(str::to_owned).collect())
    }

    fn describe_table(&mut self, table: &TableName) -> Result<FeatureSchema, StorageError> {
        self.check(Operation::DescribeTable)?;
        self.known(table).cloned()
    }

    fn drop_table(&mut self, table: &TableName) -> Result<(), StorageError> {
        self.check(Operation::DropTable)?;
        self.tables.remove(&table.to_string());
        self.events.push(ConnectionEvent::DropTable(table.to_string()));
        Ok(())
    }

    fn create_table(&mut self, spec: &TableSpec) -> Result<(), StorageError> {
        self.check(Operation::CreateTable)?;
        let attributes = spec
            .columns
            .iter()
            .map(|column| AttributeDefinition::new(column.name.clone(), column.attribute_type))
            .collect();
        let mut schema = FeatureSchema::new(attributes)?;
        if let Some(primary_key) = &spec.primary_key {
            schema = schema.with_external_primary_key(primary_key)?;
        }
        self.tables.insert(spec.table.to_string(), schema);
        self.events.push(ConnectionEvent::CreateTable(spec.clone()));
        Ok(())
    }

    fn add_primary_key(&mut self, table: &TableName, column: &str) -> Result<(), StorageError> {
        self.check(Operation::AddPrimaryKey)?;
        let mut attributes = self.known(table)?.attributes().to_vec();
        attributes.push(AttributeDefinition::new(column, AttributeType::Integer));
        let schema = FeatureSchema::new(attributes)?.with_external_primary_key(column)?;
        self.tables.insert(table.to_string(), schema);
        self.events.push(ConnectionEvent::AddPrimaryKey {
            table: table.to_string(),
            column: column.to_owned(),
        });
        Ok(())
    }

    fn load_features(
        &mut self,
        table: &TableName,
        _schema: &Arc<FeatureSchema>,
    ) -> Result<Vec<Feature>, StorageError> {
        self.known(table)?;
        Ok(Vec::new())
    }

    fn query(
        &mut self,
        query: &FilterQuery,
        _schema: &Arc<FeatureSchema>,
    ) -> Result<Vec<Feature>, StorageError> {
        self.known(query.dataset())?;
        Ok(Vec::new())
    }

    fn finalize_update(&mut self, table: &TableName) -> Result<(), StorageError> {
        self.events
            .push(ConnectionEvent::FinalizeUpdate(table.to_string()));
        self.check(Operation::FinalizeUpdate)
    }
}
