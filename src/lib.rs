//! Facade crate for the geosync write-back engine.
//!
//! This crate re-exports the core model, builders and committer, and exposes
//! the SQLite backend behind a feature flag.

#![forbid(unsafe_code)]

pub use geosync_core::{
    AbortReason, AlwaysAccept, AlwaysDecline, AttributeDefinition, AttributeType, Backend,
    CommitError, CommitOutcome, CommitSettings, Confirm, ConfirmationKind, ConnectionDescriptor,
    Dimension, Evolution, EvolutionError, EvolutionKind, EvolutionLog, EwkbCodec, Feature,
    FeatureCollection, FeatureId, FeatureSchema, FilterQuery, FilterSqlBuilder, GeometryCodec,
    PostgisSqlBuilder, SpatialConnection, SpatialReferenceSystemId, SqliteSqlBuilder, Statement,
    StatementBuilder, StorageError, TableName, TransactionCommitter, Value, WriteTarget,
    open_connection,
};

#[cfg(feature = "store-sqlite")]
pub use geosync_core::SqliteConnection;
