//! Push pending evolutions to the store in one transaction.
//!
//! A commit either creates the target table from the in-memory collection, the
//! first time a dataset is written, or replays the evolution log against the
//! existing table. Autocommit is disabled for the duration of the attempt and
//! restored on every exit path. The backend's maintenance hook runs after any
//! attempt that wrote or failed; a declined confirmation skips it, so an
//! aborted commit leaves the store untouched.

use std::{fmt, sync::Arc};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    codec::EwkbCodec,
    compat,
    confirm::{Confirm, ConfirmationKind},
    evolution::Evolution,
    feature::{Feature, FeatureCollection, Value},
    evolution_log::EvolutionLog,
    schema::FeatureSchema,
    settings::{CommitSettings, GENERATED_PRIMARY_KEY},
    statement::{Statement, StatementBuilder, StatementError},
    store::{SpatialConnection, StorageError, TableSpec},
    table::TableName,
};

/// Why a commit stopped without writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The user declined to replace an existing table.
    OverwriteDeclined,
    /// The user declined to write despite missing columns.
    SchemaMismatchDeclined,
}

/// Result of a commit attempt that raised no error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The log was replayed against the existing table.
    Committed {
        /// Statements executed.
        statements: usize,
    },
    /// The table was created and populated from the collection.
    TableCreated {
        /// Features written.
        features: usize,
    },
    /// The table exists and the log was empty.
    NothingToCommit,
    /// The user declined a confirmation; nothing was written.
    Aborted(AbortReason),
}

/// Errors raised by [`TransactionCommitter::commit`].
///
/// The log is left untouched whatever the error, so the commit can be retried.
#[derive(Debug, Error)]
pub enum CommitError {
    /// A pending evolution could not be turned into SQL.
    #[error(transparent)]
    Statement(#[from] StatementError),
    /// The store rejected an operation.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Data was committed but the maintenance hook failed.
    #[error("maintenance after writing {table} failed")]
    Finalize {
        /// Table written.
        table: String,
        /// Hook failure.
        #[source]
        source: StorageError,
    },
}

impl CommitError {
    /// Whether retrying the same commit may succeed.
    ///
    /// Statement errors stem from the pending data itself and fail again.
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Finalize { .. })
    }
}

/// Write-back state of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    table: TableName,
    primary_key: Option<String>,
    table_created: bool,
}

impl WriteTarget {
    /// A dataset whose table has not been written in this session yet. The
    /// first commit creates it.
    pub fn new_table(dataset: &str) -> Self {
        Self {
            table: TableName::parse(dataset),
            primary_key: None,
            table_created: false,
        }
    }

    /// A dataset loaded from an existing table keyed on `primary_key`.
    pub fn existing_table(dataset: &str, primary_key: impl Into<String>) -> Self {
        Self {
            table: TableName::parse(dataset),
            primary_key: Some(primary_key.into()),
            table_created: true,
        }
    }

    /// Key the table is addressed by once written. A key generated at
    /// creation replaces it.
    #[must_use]
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    /// Target table.
    pub const fn table(&self) -> &TableName {
        &self.table
    }

    /// Database key attribute, if known.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Whether the table has been created, so commits replay the log.
    pub const fn table_created(&self) -> bool {
        self.table_created
    }
}

/// Restores the connection's autocommit mode when dropped.
struct AutocommitGuard<'c, C: SpatialConnection + ?Sized> {
    connection: &'c mut C,
    previous: bool,
}

impl<'c, C: SpatialConnection + ?Sized> AutocommitGuard<'c, C> {
    fn disable(connection: &'c mut C) -> Result<Self, StorageError> {
        let previous = connection.is_autocommit();
        connection.set_autocommit(false)?;
        Ok(Self {
            connection,
            previous,
        })
    }

    fn connection(&mut self) -> &mut C {
        self.connection
    }
}

impl<C: SpatialConnection + ?Sized> Drop for AutocommitGuard<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.connection.set_autocommit(self.previous) {
            warn!("failed to restore autocommit: {err}");
        }
    }
}

/// Commits an [`EvolutionLog`] through a [`SpatialConnection`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use geo::{Geometry, Point};
/// use geosync_core::{
///     AlwaysDecline, AttributeDefinition, AttributeType, CommitOutcome, CommitSettings,
///     EvolutionLog, Feature, FeatureCollection, FeatureId, FeatureSchema, SqliteConnection,
///     TransactionCommitter, Value, WriteTarget,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let schema = Arc::new(FeatureSchema::new(vec![
///     AttributeDefinition::new("name", AttributeType::String),
///     AttributeDefinition::new("geom", AttributeType::Geometry),
/// ])?);
/// let feature = Feature::new(
///     FeatureId(1),
///     Arc::clone(&schema),
///     vec![Value::from("depot"), Value::Geometry(Geometry::Point(Point::new(1.0, 2.0)))],
/// )?;
/// let mut collection = FeatureCollection::with_features(schema, vec![feature]);
/// let mut log = EvolutionLog::new();
/// let mut target = WriteTarget::new_table("depots");
/// let mut connection = SqliteConnection::open_in_memory()?;
///
/// let committer = TransactionCommitter::new(CommitSettings::default(), &AlwaysDecline);
/// let outcome = committer.commit(&mut connection, &mut target, &mut collection, &mut log)?;
/// assert_eq!(outcome, CommitOutcome::TableCreated { features: 1 });
/// assert!(target.table_created());
/// # Ok(())
/// # }
/// ```
pub struct TransactionCommitter<'a> {
    settings: CommitSettings,
    confirm: &'a dyn Confirm,
    codec: EwkbCodec,
}

impl fmt::Debug for TransactionCommitter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCommitter")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<'a> TransactionCommitter<'a> {
    /// Committer writing with `settings` and asking `confirm` before
    /// destructive steps.
    pub fn new(settings: CommitSettings, confirm: &'a dyn Confirm) -> Self {
        Self {
            settings,
            confirm,
            codec: EwkbCodec::default().with_z_value(settings.nan_z_value),
        }
    }

    /// Settings in use.
    pub const fn settings(&self) -> &CommitSettings {
        &self.settings
    }

    /// Write pending work for `target`.
    ///
    /// The log is cleared only when the attempt succeeds. Declined
    /// confirmations return [`CommitOutcome::Aborted`] without writing.
    pub fn commit<C: SpatialConnection + ?Sized>(
        &self,
        connection: &mut C,
        target: &mut WriteTarget,
        collection: &mut FeatureCollection,
        log: &mut EvolutionLog,
    ) -> Result<CommitOutcome, CommitError> {
        if target.table_created && log.is_empty() {
            debug!("nothing to commit to {}", target.table);
            return Ok(CommitOutcome::NothingToCommit);
        }

        let attempt = self.attempt(connection, target, collection, log);
        if let Ok(CommitOutcome::Aborted(reason)) = attempt {
            debug!("skipping maintenance of {}: {reason:?}", target.table);
            return attempt;
        }
        let finalized = connection.finalize_update(&target.table);
        match (attempt, finalized) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(source)) => Err(CommitError::Finalize {
                table: target.table.to_string(),
                source,
            }),
            (Err(err), Err(hook)) => {
                warn!("maintenance of {} failed after an earlier error: {hook}", target.table);
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }

    fn attempt<C: SpatialConnection + ?Sized>(
        &self,
        connection: &mut C,
        target: &mut WriteTarget,
        collection: &mut FeatureCollection,
        log: &mut EvolutionLog,
    ) -> Result<CommitOutcome, CommitError> {
        let mut guard = AutocommitGuard::disable(connection)?;
        if target.table_created {
            debug!("update mode: replaying log on {}", target.table);
            self.update_table(guard.connection(), target, collection, log)
        } else {
            debug!("create mode: writing {}", target.table);
            self.create_table(guard.connection(), target, collection, log)
        }
    }

    fn builder(&self, table: &TableName) -> StatementBuilder<'_> {
        StatementBuilder::new(table.clone(), &self.codec)
            .with_srid(self.settings.target_srid())
            .with_dimension(self.settings.dimension)
            .with_normalized_column_names(self.settings.normalized_column_names)
    }

    fn create_table<C: SpatialConnection + ?Sized>(
        &self,
        connection: &mut C,
        target: &mut WriteTarget,
        collection: &mut FeatureCollection,
        log: &mut EvolutionLog,
    ) -> Result<CommitOutcome, CommitError> {
        let table = target.table.clone();
        let exists = connection.table_exists(&table)?;
        if exists && !self.confirm.confirm(ConfirmationKind::OverwriteTable) {
            info!("kept existing table {table}");
            return Ok(CommitOutcome::Aborted(AbortReason::OverwriteDeclined));
        }

        let stripped = FeatureSchema::clone(collection.schema()).remove_external_primary_key();
        let spec = TableSpec::from_schema(
            table.clone(),
            &stripped,
            self.settings.target_srid(),
            self.settings.dimension,
            self.settings.normalized_column_names,
        );
        let builder = self.builder(&table);
        let inserts = collection
            .features()
            .iter()
            .map(|feature| builder.insert(feature))
            .collect::<Result<Vec<_>, _>>()?;

        if exists {
            connection.drop_table(&table)?;
        }
        collection.replace_schema(stripped);
        connection.create_table(&spec)?;
        for statement in &inserts {
            connection.execute(statement)?;
        }
        let features = inserts.len();

        if self.settings.create_primary_key {
            connection.add_primary_key(&table, GENERATED_PRIMARY_KEY)?;
            connection.commit()?;
            let schema = Arc::new(connection.describe_table(&table)?);
            let reloaded = connection.load_features(&table, &schema)?;
            collection.replace_schema(schema.as_ref().clone());
            collection.replace_features(reloaded);
            target.primary_key = Some(GENERATED_PRIMARY_KEY.to_owned());
        }
        connection.commit()?;

        target.table_created = true;
        log.clear();
        info!("created {table} with {features} features");
        Ok(CommitOutcome::TableCreated { features })
    }

    fn update_table<C: SpatialConnection + ?Sized>(
        &self,
        connection: &mut C,
        target: &WriteTarget,
        collection: &FeatureCollection,
        log: &mut EvolutionLog,
    ) -> Result<CommitOutcome, CommitError> {
        let table = &target.table;
        let live_columns = connection.table_columns(table)?;
        let compatibility = compat::check(
            &live_columns,
            collection.schema(),
            self.settings.normalized_column_names,
        );
        if compatibility.is_degraded() {
            warn!(
                "{table} lacks columns {:?} of the in-memory schema",
                compatibility.missing
            );
            if !self.confirm.confirm(ConfirmationKind::SchemaMismatch) {
                return Ok(CommitOutcome::Aborted(AbortReason::SchemaMismatchDeclined));
            }
        }

        let mut builder = self.builder(table);
        if let Some(primary_key) = target.primary_key.as_deref() {
            builder = builder.with_primary_key(primary_key);
        }
        let planned = log
            .iter()
            .map(|evolution| Ok((evolution, builder.for_evolution(evolution)?)))
            .collect::<Result<Vec<(&Evolution, Vec<Statement>)>, StatementError>>()?;

        info!(
            "committing {} evolutions to {table} (primary key {})",
            planned.len(),
            target.primary_key.as_deref().unwrap_or("none")
        );
        let mut statements = 0;
        for (evolution, batch) in &planned {
            for statement in batch {
                connection.execute(statement)?;
            }
            statements += batch.len();
            log_evolution(evolution, target.primary_key.as_deref());
        }
        connection.commit()?;

        log.clear();
        Ok(CommitOutcome::Committed { statements })
    }
}

fn log_evolution(evolution: &Evolution, primary_key: Option<&str>) {
    let key = |feature: &Feature| match primary_key.and_then(|name| feature.attribute(name)) {
        Some(Value::Integer(key)) => key.to_string(),
        Some(Value::String(key)) => key.clone(),
        Some(other) => format!("{other:?}"),
        None => "?".to_owned(),
    };
    match evolution {
        Evolution::Creation { new } => info!("  create feature {}", new.id()),
        Evolution::Modification { new, .. } => info!("  modify {}/{}", new.id(), key(new)),
        Evolution::Suppression { old } => info!("  delete {}/{}", old.id(), key(old)),
    }
}
