//! Write-back synchronisation of edited feature layers to spatial stores.
//!
//! Responsibilities:
//! - Record in-memory edits as a compact, per-feature evolution log.
//! - Translate pending evolutions into parameterised SQL and commit them in
//!   one transaction, creating the target table on first write.
//! - Render bounding-box filter queries and read features back.
//!
//! Boundaries:
//! - Storage backends sit behind [`SpatialConnection`]; user prompts behind
//!   [`Confirm`].
//! - Conflict detection policy belongs to callers, which may drop pending
//!   evolutions through [`EvolutionLog::remove_evolution`].
//!
//! Invariants:
//! - At most one pending evolution per feature, equal to the fold of every
//!   edit recorded since the last commit.
//! - A failed or declined commit leaves the log untouched.

#![forbid(unsafe_code)]

pub mod codec;
pub mod commit;
pub mod compat;
pub mod confirm;
pub mod evolution;
pub mod evolution_log;
pub mod feature;
pub mod filter;
pub mod schema;
pub mod settings;
pub mod statement;
pub mod store;
pub mod table;
pub mod test_support;

pub use codec::{CodecError, DecodedGeometry, Dimension, EwkbCodec, GeometryCodec, ReadProjection};
pub use commit::{AbortReason, CommitError, CommitOutcome, TransactionCommitter, WriteTarget};
pub use compat::SchemaCompatibility;
pub use confirm::{AlwaysAccept, AlwaysDecline, Confirm, ConfirmationKind};
pub use evolution::{Evolution, EvolutionError, EvolutionKind};
pub use evolution_log::{EvolutionLog, PrimaryKey};
pub use feature::{Feature, FeatureCollection, FeatureError, FeatureId, ObjectValue, Value};
pub use filter::{
    FilterError, FilterQuery, FilterSqlBuilder, Limit, PostgisSqlBuilder,
    SQLITE_ENVELOPE_FUNCTION, SpatialReferenceSystemId, SqliteSqlBuilder,
};
pub use schema::{AttributeDefinition, AttributeType, FeatureSchema, SchemaError};
pub use settings::{CommitSettings, GENERATED_PRIMARY_KEY};
pub use statement::{SqlParam, Statement, StatementBuilder, StatementError};
pub use store::{
    Backend, BackendError, ColumnSpec, ConnectionDescriptor, SpatialConnection, StorageError,
    TableSpec, open_connection,
};
#[cfg(feature = "store-sqlite")]
pub use store::{LAYER_REGISTRY_TABLE, SqliteConnection};
pub use table::{TableName, quote_identifier, quote_literal};
