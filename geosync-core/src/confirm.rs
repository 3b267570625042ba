//! User confirmation capability injected into the committer.

use std::fmt;

/// Question the committer needs answered before a destructive step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationKind {
    /// A table with the target name already exists and would be replaced.
    OverwriteTable,
    /// Some in-memory attributes have no matching column in the live table.
    SchemaMismatch,
}

impl fmt::Display for ConfirmationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverwriteTable => f.write_str("overwrite existing table"),
            Self::SchemaMismatch => f.write_str("write despite schema mismatch"),
        }
    }
}

/// Answers [`ConfirmationKind`] questions.
///
/// Closures taking a [`ConfirmationKind`] implement the trait directly.
///
/// ```
/// use geosync_core::{Confirm, ConfirmationKind};
///
/// let only_overwrite = |kind: ConfirmationKind| kind == ConfirmationKind::OverwriteTable;
/// assert!(only_overwrite.confirm(ConfirmationKind::OverwriteTable));
/// assert!(!only_overwrite.confirm(ConfirmationKind::SchemaMismatch));
/// ```
pub trait Confirm {
    /// Whether the step described by `kind` may proceed.
    fn confirm(&self, kind: ConfirmationKind) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(ConfirmationKind) -> bool,
{
    fn confirm(&self, kind: ConfirmationKind) -> bool {
        self(kind)
    }
}

/// Accepts every question.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAccept;

impl Confirm for AlwaysAccept {
    fn confirm(&self, _kind: ConfirmationKind) -> bool {
        true
    }
}

/// Declines every question; the safe default for unattended runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDecline;

impl Confirm for AlwaysDecline {
    fn confirm(&self, _kind: ConfirmationKind) -> bool {
        false
    }
}
