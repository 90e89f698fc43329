use geo::{Geometry, MultiLineString, MultiPoint, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

pub type FeatureId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    String(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

/// One record as stored by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub id: FeatureId,
    pub geometry: Option<Geometry>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl FeatureRecord {
    pub fn new(id: FeatureId, geometry: Option<Geometry>) -> Self {
        Self {
            id,
            geometry,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

/// Where a record stands relative to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Created in this session, unknown to the store.
    Staged,
    /// Present in the store.
    Stored,
}

#[derive(Debug)]
pub struct StagedRecord {
    pub record: FeatureRecord,
    pub persistence: Persistence,
    pub edited: bool,
    pub deleted: bool,
    /// Members of a multi geometry removed on their own. Indices stay those of
    /// `record.geometry`, so sibling parts keep addressing their member.
    pub removed_parts: BTreeSet<usize>,
}

pub type SharedRecord = Rc<RefCell<StagedRecord>>;

impl StagedRecord {
    pub fn stored(record: FeatureRecord) -> SharedRecord {
        Rc::new(RefCell::new(Self {
            record,
            persistence: Persistence::Stored,
            edited: false,
            deleted: false,
            removed_parts: BTreeSet::new(),
        }))
    }

    pub fn created(record: FeatureRecord) -> SharedRecord {
        Rc::new(RefCell::new(Self {
            record,
            persistence: Persistence::Staged,
            edited: false,
            deleted: false,
            removed_parts: BTreeSet::new(),
        }))
    }

    /// Number of parts the record splits into.
    pub fn part_count(&self) -> usize {
        match &self.record.geometry {
            Some(Geometry::MultiPoint(multi)) if !multi.0.is_empty() => multi.0.len(),
            Some(Geometry::MultiLineString(multi)) if !multi.0.is_empty() => multi.0.len(),
            Some(Geometry::MultiPolygon(multi)) if !multi.0.is_empty() => multi.0.len(),
            _ => 1,
        }
    }

    pub fn is_part_removed(&self, part: usize) -> bool {
        self.deleted || self.removed_parts.contains(&part)
    }

    /// Removes one part. The record itself is deleted with its last part.
    pub fn remove_part(&mut self, part: usize) {
        let count = self.part_count();
        if count > 1 {
            self.removed_parts.insert(part);
        }
        if count <= 1 || (0..count).all(|part| self.removed_parts.contains(&part)) {
            self.deleted = true;
        } else {
            self.edited = true;
        }
    }

    /// The record as it is written back, removed members left out.
    pub fn effective_record(&self) -> FeatureRecord {
        let mut record = self.record.clone();
        if self.removed_parts.is_empty() {
            return record;
        }
        let removed = &self.removed_parts;
        record.geometry = match record.geometry {
            Some(Geometry::MultiPoint(multi)) => {
                Some(Geometry::MultiPoint(MultiPoint::new(kept(multi.0, removed))))
            }
            Some(Geometry::MultiLineString(multi)) => {
                Some(Geometry::MultiLineString(MultiLineString::new(kept(multi.0, removed))))
            }
            Some(Geometry::MultiPolygon(multi)) => {
                Some(Geometry::MultiPolygon(MultiPolygon::new(kept(multi.0, removed))))
            }
            geometry => geometry,
        };
        record
    }
}

fn kept<T>(members: Vec<T>, removed: &BTreeSet<usize>) -> Vec<T> {
    members
        .into_iter()
        .enumerate()
        .filter(|(part, _)| !removed.contains(part))
        .map(|(_, member)| member)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Point};

    fn three_wells() -> SharedRecord {
        let wells: Vec<Point> = vec![
            point!(x: 0.0, y: 0.0),
            point!(x: 1.0, y: 0.0),
            point!(x: 2.0, y: 0.0),
        ];
        let geometry = Geometry::MultiPoint(MultiPoint::new(wells));
        StagedRecord::stored(FeatureRecord::new(9, Some(geometry)))
    }

    #[test]
    fn removing_parts_keeps_the_rest() {
        let shared = three_wells();
        let mut staged = shared.borrow_mut();
        staged.remove_part(1);
        assert!(!staged.deleted);
        assert!(staged.edited);
        assert!(staged.is_part_removed(1));
        assert!(!staged.is_part_removed(0));
        assert_eq!(
            staged.effective_record().geometry,
            Some(Geometry::MultiPoint(MultiPoint::new(vec![
                point!(x: 0.0, y: 0.0),
                point!(x: 2.0, y: 0.0)
            ])))
        );
        assert_eq!(staged.part_count(), 3);
    }

    #[test]
    fn last_part_deletes_the_record() {
        let shared = three_wells();
        let mut staged = shared.borrow_mut();
        for part in [2, 0, 1] {
            staged.remove_part(part);
        }
        assert!(staged.deleted);

        let well = Geometry::Point(point!(x: 1.0, y: 1.0));
        let single = StagedRecord::stored(FeatureRecord::new(1, Some(well)));
        single.borrow_mut().remove_part(0);
        assert!(single.borrow().deleted);
    }
}
