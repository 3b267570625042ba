//! Options controlling how a commit writes to the store.

use crate::codec::Dimension;

/// Name of the key column generated when a new table gets a primary key.
pub const GENERATED_PRIMARY_KEY: &str = "gid";

/// Write options of a [`crate::TransactionCommitter`].
///
/// # Examples
///
/// ```
/// use geosync_core::{CommitSettings, Dimension};
///
/// let settings = CommitSettings::default();
/// assert_eq!(settings.target_srid(), None);
/// assert_eq!(settings.dimension, Dimension::Xy);
///
/// let tagged = CommitSettings { srid: 2154, ..settings };
/// assert_eq!(tagged.target_srid(), Some(2154));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CommitSettings {
    /// SRID written into geometries and registered for new tables; `0`
    /// writes untagged geometries.
    pub srid: i32,
    /// Dimension of written geometries.
    pub dimension: Dimension,
    /// Add a generated `gid` key when creating a table.
    pub create_primary_key: bool,
    /// Lower-case column names when creating and writing.
    pub normalized_column_names: bool,
    /// Z ordinate written for three-dimensional output, since in-memory
    /// geometries are planar.
    pub nan_z_value: f64,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            srid: 0,
            dimension: Dimension::Xy,
            create_primary_key: false,
            normalized_column_names: false,
            nan_z_value: 0.0,
        }
    }
}

impl CommitSettings {
    /// SRID to tag geometries with, if any.
    pub const fn target_srid(&self) -> Option<i32> {
        if self.srid == 0 { None } else { Some(self.srid) }
    }
}
