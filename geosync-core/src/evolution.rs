//! Net pending change for one feature and the algebra merging successive
//! edits into it.

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::feature::{Feature, FeatureId};

/// Discriminant of an [`Evolution`], used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvolutionKind {
    /// A feature that did not exist in the store.
    Creation,
    /// A change to a stored feature.
    Modification,
    /// Removal of a stored feature.
    Suppression,
}

impl fmt::Display for EvolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Creation => "creation",
            Self::Modification => "modification",
            Self::Suppression => "suppression",
        };
        f.write_str(name)
    }
}

/// Errors raised by [`Evolution`] constructors and [`Evolution::merge_into`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvolutionError {
    /// The pending and incoming edits cannot follow each other.
    #[error("cannot apply a {next} to feature {id} after a pending {previous}")]
    IllegalMerge {
        /// Feature concerned.
        id: FeatureId,
        /// Pending evolution kind.
        previous: EvolutionKind,
        /// Incoming evolution kind.
        next: EvolutionKind,
    },
    /// The two snapshots of a modification describe different features.
    #[error("snapshots of a modification differ: feature {old} vs {new}")]
    MismatchedFeatures {
        /// Identifier of the old snapshot.
        old: FeatureId,
        /// Identifier of the new snapshot.
        new: FeatureId,
    },
    /// The two snapshots of a modification use different schemas.
    #[error("snapshots of feature {id} use different schemas")]
    MismatchedSchemas {
        /// Feature concerned.
        id: FeatureId,
    },
}

/// One net change to one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Evolution {
    /// Insert `new`.
    Creation {
        /// State to insert.
        new: Feature,
    },
    /// Move the stored row from `old` to `new`.
    Modification {
        /// Last known committed state.
        old: Feature,
        /// Current in-memory state.
        new: Feature,
    },
    /// Delete the row described by `old`.
    Suppression {
        /// Last known committed state.
        old: Feature,
    },
}

impl Evolution {
    /// A creation of `new`.
    pub const fn creation(new: Feature) -> Self {
        Self::Creation { new }
    }

    /// A modification from `old` to `new`.
    ///
    /// Both snapshots must carry the same identifier and schema.
    pub fn modification(old: Feature, new: Feature) -> Result<Self, EvolutionError> {
        if old.id() != new.id() {
            return Err(EvolutionError::MismatchedFeatures {
                old: old.id(),
                new: new.id(),
            });
        }
        if !Arc::ptr_eq(old.schema(), new.schema()) && old.schema() != new.schema() {
            return Err(EvolutionError::MismatchedSchemas { id: new.id() });
        }
        Ok(Self::Modification { old, new })
    }

    /// A suppression of `old`.
    pub const fn suppression(old: Feature) -> Self {
        Self::Suppression { old }
    }

    /// Kind of change.
    pub const fn kind(&self) -> EvolutionKind {
        match self {
            Self::Creation { .. } => EvolutionKind::Creation,
            Self::Modification { .. } => EvolutionKind::Modification,
            Self::Suppression { .. } => EvolutionKind::Suppression,
        }
    }

    /// Identifier of the feature concerned.
    pub const fn feature_id(&self) -> FeatureId {
        match self {
            Self::Creation { new } | Self::Modification { new, .. } => new.id(),
            Self::Suppression { old } => old.id(),
        }
    }

    /// Last known committed snapshot, absent for creations.
    pub const fn old_feature(&self) -> Option<&Feature> {
        match self {
            Self::Creation { .. } => None,
            Self::Modification { old, .. } | Self::Suppression { old } => Some(old),
        }
    }

    /// Current snapshot, absent for suppressions.
    pub const fn new_feature(&self) -> Option<&Feature> {
        match self {
            Self::Creation { new } | Self::Modification { new, .. } => Some(new),
            Self::Suppression { .. } => None,
        }
    }

    /// Fold `self`, a newly recorded edit, onto the `previous` pending
    /// evolution of the same feature.
    ///
    /// Returns `Ok(None)` when the two cancel out, which happens when a
    /// feature created in the current batch is deleted again.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use geosync_core::{
    ///     AttributeDefinition, AttributeType, Evolution, Feature, FeatureId, FeatureSchema,
    /// };
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let schema = Arc::new(FeatureSchema::new(vec![
    ///     AttributeDefinition::new("geom", AttributeType::Geometry),
    /// ])?);
    /// let feature = Feature::empty(FeatureId(1), schema);
    /// let created = Evolution::creation(feature.clone());
    /// let merged = Evolution::suppression(feature).merge_into(Some(created))?;
    /// assert!(merged.is_none());
    /// # Ok(())
    /// # }
    /// ```
    pub fn merge_into(self, previous: Option<Self>) -> Result<Option<Self>, EvolutionError> {
        let Some(previous) = previous else {
            return Ok(Some(self));
        };
        let id = self.feature_id();
        match (previous, self) {
            (Self::Creation { .. }, Self::Modification { new, .. }) => {
                Ok(Some(Self::Creation { new }))
            }
            (Self::Creation { .. }, Self::Suppression { .. }) => Ok(None),
            (Self::Modification { old, .. }, Self::Modification { new, .. }) => {
                Self::modification(old, new).map(Some)
            }
            (Self::Modification { old, .. }, Self::Suppression { .. }) => {
                Ok(Some(Self::Suppression { old }))
            }
            (Self::Suppression { old }, Self::Creation { new }) => {
                Self::modification(old, new).map(Some)
            }
            (previous, next) => Err(EvolutionError::IllegalMerge {
                id,
                previous: previous.kind(),
                next: next.kind(),
            }),
        }
    }
}

impl fmt::Display for Evolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of feature {}", self.kind(), self.feature_id())
    }
}
