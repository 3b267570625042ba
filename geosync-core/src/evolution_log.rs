//! Ordered, feature-keyed log of pending evolutions.
//!
//! The log keeps at most one [`Evolution`] per feature. Entries are ordered by
//! the first edit made to each feature since the last commit; merging a later
//! edit keeps the feature's original position.

use std::collections::{BTreeMap, HashMap};

use crate::{
    evolution::{Evolution, EvolutionError},
    feature::{Feature, FeatureId, Value},
};

/// Database key of a stored feature, used to index pending changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimaryKey {
    /// Integer key.
    Integer(i64),
    /// Text key.
    Text(String),
}

impl PrimaryKey {
    /// Key held by `value`, if it is a usable key type.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(key) => Some(Self::Integer(*key)),
            Value::String(key) => Some(Self::Text(key.clone())),
            _ => None,
        }
    }
}

/// Pending evolutions of one editing session.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use geosync_core::{
///     AttributeDefinition, AttributeType, EvolutionLog, Feature, FeatureId, FeatureSchema,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let schema = Arc::new(FeatureSchema::new(vec![
///     AttributeDefinition::new("geom", AttributeType::Geometry),
/// ])?);
/// let feature = Feature::empty(FeatureId(1), schema);
///
/// let mut log = EvolutionLog::new();
/// log.add_creation(&feature)?;
/// log.add_suppression(&feature)?;
/// assert!(log.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvolutionLog {
    entries: BTreeMap<u64, Evolution>,
    positions: HashMap<FeatureId, u64>,
    next_position: u64,
}

impl EvolutionLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `feature` was created.
    pub fn add_creation(&mut self, feature: &Feature) -> Result<(), EvolutionError> {
        self.record(Evolution::creation(feature.clone()))
    }

    /// Record that `feature` changed from `old_feature`.
    pub fn add_modification(
        &mut self,
        feature: &Feature,
        old_feature: &Feature,
    ) -> Result<(), EvolutionError> {
        self.record(Evolution::modification(
            old_feature.clone(),
            feature.clone(),
        )?)
    }

    /// Record that `feature` was deleted.
    pub fn add_suppression(&mut self, feature: &Feature) -> Result<(), EvolutionError> {
        self.record(Evolution::suppression(feature.clone()))
    }

    /// Merge `incoming` with any pending evolution of the same feature.
    ///
    /// On error the log is left exactly as it was.
    pub fn record(&mut self, incoming: Evolution) -> Result<(), EvolutionError> {
        let id = incoming.feature_id();
        let position = self.positions.get(&id).copied();
        let previous = position.and_then(|p| self.entries.remove(&p));
        let restore = previous.clone();

        match incoming.merge_into(previous) {
            Ok(Some(merged)) => {
                let position = position.unwrap_or_else(|| self.allocate_position());
                self.entries.insert(position, merged);
                self.positions.insert(id, position);
                Ok(())
            }
            Ok(None) => {
                self.positions.remove(&id);
                Ok(())
            }
            Err(err) => {
                if let (Some(position), Some(previous)) = (position, restore) {
                    self.entries.insert(position, previous);
                }
                Err(err)
            }
        }
    }

    fn allocate_position(&mut self) -> u64 {
        let position = self.next_position;
        self.next_position += 1;
        position
    }

    /// Drop the pending evolution of `id`, returning it.
    ///
    /// Intended for conflict managers that find the pending state already
    /// matches the store (a false conflict).
    pub fn remove_evolution(&mut self, id: FeatureId) -> Option<Evolution> {
        let position = self.positions.remove(&id)?;
        self.entries.remove(&position)
    }

    /// Pending evolution of `id`.
    pub fn get(&self, id: FeatureId) -> Option<&Evolution> {
        self.positions
            .get(&id)
            .and_then(|position| self.entries.get(position))
    }

    /// Evolutions in log order.
    pub fn iter(&self) -> impl Iterator<Item = &Evolution> + '_ {
        self.entries.values()
    }

    /// Number of pending evolutions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every pending evolution.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.next_position = 0;
    }

    /// Modifications and suppressions keyed by the database key of their last
    /// committed snapshot.
    ///
    /// Creations have no stored row and are left out, as are snapshots whose
    /// key is null or of an unusable type.
    pub fn indexed_by_primary_key(&self, primary_key: &str) -> BTreeMap<PrimaryKey, &Evolution> {
        self.iter()
            .filter_map(|evolution| {
                let key = evolution
                    .old_feature()?
                    .attribute(primary_key)
                    .and_then(PrimaryKey::from_value)?;
                Some((key, evolution))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a EvolutionLog {
    type Item = &'a Evolution;
    type IntoIter = std::collections::btree_map::Values<'a, u64, Evolution>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
