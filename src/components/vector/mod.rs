pub mod feature;
pub mod record;

use geo::{
    BooleanOps, BoundingRect, Coord, Distance, Euclidean, Intersects, LineString, MultiLineString,
    Point, Rect,
};
use itertools::Itertools;
use log::{debug, error, info};
use std::{cell::RefCell, collections::BTreeMap, fmt::Debug, path::Path, rc::Rc};

use crate::{
    components::{
        backends::{ChangeSet, NativeLayer},
        dataset::Dataset,
    },
    errors::{GeodataError, Result},
};

use feature::{Feature, FeatureAccess};
use record::{FeatureId, FeatureRecord, Persistence, SharedRecord, StagedRecord};

/// Notification emitted by a [FeatureLayer].
#[derive(Debug, Clone)]
pub enum FeatureEvent {
    Added(Feature),
    Removed(Feature),
}

type Observer = Box<dyn FnMut(&FeatureEvent)>;

/// Named view over one vector layer of a [Dataset].
///
/// Every record the layer hands out or creates is staged here; edits,
/// creations and soft deletions stay local until [FeatureLayer::save_override]
/// or [FeatureLayer::save_new]. Unchanged stored records are dropped from the
/// stage once no [Feature] refers to them, so later reads see the driver's
/// current state again.
pub struct FeatureLayer {
    name: String,
    native: Option<Box<dyn NativeLayer>>,
    origin: Dataset,
    staged: RefCell<BTreeMap<FeatureId, SharedRecord>>,
    observers: Vec<Observer>,
}

impl Debug for FeatureLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureLayer")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .field("staged", &self.staged.borrow().len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl FeatureLayer {
    pub(crate) fn bind(name: &str, origin: Dataset, native: Result<Box<dyn NativeLayer>>) -> Self {
        let native = match native {
            Ok(native) => Some(native),
            Err(error) => {
                error!("Feature layer '{name}' could not be bound: {error}");
                None
            }
        };
        let layer = Self {
            name: name.to_string(),
            native,
            origin,
            staged: RefCell::new(BTreeMap::new()),
            observers: Vec::new(),
        };
        info!("new {layer:?}");
        layer
    }

    pub fn is_valid(&self) -> bool {
        self.native.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataset(&self) -> &Dataset {
        &self.origin
    }

    /// Registers `observer` for every later [FeatureEvent].
    pub fn connect(&mut self, observer: impl FnMut(&FeatureEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn emit(&mut self, event: FeatureEvent) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }

    /// Staged state of `record`, which wins over what the driver returned.
    fn stage(&self, record: FeatureRecord) -> SharedRecord {
        self.staged
            .borrow_mut()
            .entry(record.id)
            .or_insert_with(|| StagedRecord::stored(record))
            .clone()
    }

    /// Drops staged records that hold no local change and no live handle.
    fn evict_unreferenced(&self) {
        self.staged.borrow_mut().retain(|_, shared| {
            let staged = shared.borrow();
            staged.persistence == Persistence::Staged
                || staged.edited
                || staged.deleted
                || !staged.removed_parts.is_empty()
                || Rc::strong_count(shared) > 1
        });
    }

    fn created(&self) -> Vec<SharedRecord> {
        self.staged
            .borrow()
            .values()
            .filter(|shared| shared.borrow().persistence == Persistence::Staged)
            .cloned()
            .collect()
    }

    fn stored_records(&self) -> Vec<FeatureRecord> {
        match self.native.as_ref().map(|native| native.records()) {
            Some(Ok(records)) => records,
            Some(Err(error)) => {
                error!("Could not read features of layer '{}': {error}", self.name);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// First part of record `id`. Which part comes first follows the order of
    /// the record's multi geometry.
    pub fn get_feature_by_id(&self, id: FeatureId) -> Option<Feature> {
        self.evict_unreferenced();
        let staged = self.staged.borrow().get(&id).cloned();
        let shared = match staged {
            Some(shared) => shared,
            None => {
                let record = match self.native.as_ref()?.record(id) {
                    Ok(record) => record?,
                    Err(error) => {
                        error!("Could not read feature {id} of layer '{}': {error}", self.name);
                        return None;
                    }
                };
                self.stage(record)
            }
        };
        if shared.borrow().deleted {
            return None;
        }
        Feature::parts(&shared).into_iter().next()
    }

    /// Every part of every record that is not soft deleted, stored records
    /// first.
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.evict_unreferenced();
        self.stored_records()
            .into_iter()
            .map(|record| self.stage(record))
            .chain(self.created())
            .filter(|shared| !shared.borrow().deleted)
            .flat_map(|shared| Feature::parts(&shared))
    }

    pub fn get_all_features(&self) -> Vec<Feature> {
        self.features().collect()
    }

    /// Features within `radius` meters of (`x`, `y`), nearest first, at most
    /// `max_features` of them.
    pub fn get_features_near_position(
        &self,
        x: f64,
        y: f64,
        radius: f64,
        max_features: usize,
    ) -> Vec<Feature> {
        let area = Rect::new(
            Coord {
                x: x - radius,
                y: y - radius,
            },
            Coord {
                x: x + radius,
                y: y + radius,
            },
        );
        self.evict_unreferenced();
        let stored = match self.native.as_ref().map(|native| native.records_in_rect(area)) {
            Some(Ok(records)) => records,
            Some(Err(error)) => {
                error!("Spatial query on layer '{}' failed: {error}", self.name);
                Vec::new()
            }
            None => Vec::new(),
        };

        // Staged edits may have moved records into or out of the area.
        let mut candidates: BTreeMap<FeatureId, SharedRecord> = stored
            .into_iter()
            .map(|record| (record.id, self.stage(record)))
            .collect();
        for (id, shared) in self.staged.borrow().iter() {
            let staged = shared.borrow();
            if staged.edited || staged.persistence == Persistence::Staged {
                candidates.insert(*id, shared.clone());
            }
        }

        let position = Point::new(x, y);
        let found = candidates
            .values()
            .filter(|shared| !shared.borrow().deleted)
            .flat_map(Feature::parts)
            .filter_map(|feature| {
                let distance = Euclidean.distance(&feature.geometry()?, &position);
                (distance <= radius).then_some((distance, feature))
            })
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .take(max_features)
            .map(|(_, feature)| feature)
            .collect_vec();
        debug!(
            "{} features of layer '{}' within {radius} m of ({x}, {y})",
            found.len(),
            self.name
        );
        found
    }

    /// Line features crossing the square with its top left corner at
    /// (`top_left_x`, `top_left_y`), clipped to it. At most `max_lines` pieces
    /// are returned.
    pub fn crop_lines_to_square(
        &self,
        top_left_x: f64,
        top_left_y: f64,
        size_meters: f64,
        max_lines: usize,
    ) -> Vec<LineString> {
        let square = Rect::new(
            Coord {
                x: top_left_x,
                y: top_left_y - size_meters,
            },
            Coord {
                x: top_left_x + size_meters,
                y: top_left_y,
            },
        );
        let clip = square.to_polygon();
        self.features()
            .filter_map(|feature| match feature {
                Feature::Line(line) => line.line(),
                _ => None,
            })
            .filter(|line| {
                line.bounding_rect()
                    .is_some_and(|envelope| envelope.intersects(&square))
            })
            .flat_map(|line| clip.clip(&MultiLineString::new(vec![line]), false).0)
            .filter(|piece| piece.0.len() > 1)
            .take(max_lines)
            .collect()
    }

    /// Stages a new, empty record and announces it.
    pub fn create_feature(&mut self) -> Feature {
        let stored_next = match self.native.as_ref().map(|native| native.allocate_id()) {
            Some(Ok(id)) => id,
            Some(Err(error)) => {
                error!("Could not allocate an id in layer '{}': {error}", self.name);
                0
            }
            None => 0,
        };
        let staged_next = self
            .staged
            .borrow()
            .keys()
            .next_back()
            .map_or(0, |last| last + 1);
        let id = stored_next.max(staged_next);

        let shared = StagedRecord::created(FeatureRecord::new(id, None));
        self.staged.borrow_mut().insert(id, shared.clone());
        let feature = Feature::parts(&shared).remove(0);
        debug!("created feature {id} in layer '{}'", self.name);
        self.emit(FeatureEvent::Added(feature.clone()));
        feature
    }

    /// Soft deletes `feature`. For a part of a multi geometry only that member
    /// goes; the record is deleted with its last part. Storage is only touched
    /// on save.
    pub fn remove_feature(&mut self, feature: &Feature) {
        let handle = feature.handle();
        handle.mark_removed();
        self.staged
            .borrow_mut()
            .entry(feature.id())
            .or_insert_with(|| handle.shared().clone());
        self.emit(FeatureEvent::Removed(feature.clone()));
    }

    fn pending_changes(&self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for (id, shared) in self.staged.borrow().iter() {
            let staged = shared.borrow();
            match (staged.persistence, staged.deleted) {
                (Persistence::Staged, true) => {}
                (Persistence::Staged, false) => changes.created.push(staged.effective_record()),
                (Persistence::Stored, true) => changes.deleted.push(*id),
                (Persistence::Stored, false) if staged.edited => {
                    changes.updated.push(staged.effective_record())
                }
                (Persistence::Stored, false) => {}
            }
        }
        changes
    }

    /// Writes creations, edits and deletions back to the layer's own store.
    ///
    /// Fails with [GeodataError::WriteAccessViolation] before anything else
    /// when the dataset was opened read only.
    pub fn save_override(&mut self) -> Result<()> {
        if !self.origin.write_access() {
            return Err(GeodataError::WriteAccessViolation {
                layer: self.name.clone(),
            });
        }
        let changes = self.pending_changes();
        let native = self
            .native
            .as_mut()
            .ok_or_else(|| GeodataError::InvalidDataset(self.name.clone()))?;
        if !changes.is_empty() {
            native.apply(&changes)?;
        }
        info!(
            "saved layer '{}': {} created, {} updated, {} deleted",
            self.name,
            changes.created.len(),
            changes.updated.len(),
            changes.deleted.len()
        );

        let mut staged = self.staged.borrow_mut();
        staged.retain(|_, shared| !shared.borrow().deleted);
        for shared in staged.values() {
            let mut staged = shared.borrow_mut();
            staged.persistence = Persistence::Stored;
            staged.edited = false;
        }
        Ok(())
    }

    /// Writes the layer as it currently looks, staged state included, to a
    /// new store at `path`. The layer's own store is left untouched.
    pub fn save_new<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let native = self
            .native
            .as_ref()
            .ok_or_else(|| GeodataError::InvalidDataset(self.name.clone()))?;
        let mut merged: BTreeMap<FeatureId, FeatureRecord> = native
            .records()?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        for (id, shared) in self.staged.borrow().iter() {
            let staged = shared.borrow();
            if staged.deleted {
                merged.remove(id);
            } else {
                merged.insert(*id, staged.effective_record());
            }
        }
        let records = merged.into_values().collect_vec();
        native.write_copy(path.as_ref(), &records)?;
        info!(
            "wrote {} features of layer '{}' to '{}'",
            records.len(),
            self.name,
            path.as_ref().display()
        );
        Ok(())
    }
}
