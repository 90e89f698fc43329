//! Typed features over staged records.
//!
//! A driver record is split into parts when it is ingested: multi geometries
//! give one part per member. Each part is wrapped exactly once in the
//! [Feature] variant matching its geometry and keeps that variant for life.

use ambassador::{delegatable_trait, Delegate};
use geo::{Geometry, LineString, Point, Polygon};
use std::{collections::BTreeMap, rc::Rc};

use crate::components::vector::record::{FeatureId, FieldValue, SharedRecord};

/// Access shared by every feature variant.
#[delegatable_trait]
pub trait FeatureAccess {
    fn id(&self) -> FeatureId;
    /// Index of the wrapped part within a multi geometry, 0 otherwise.
    fn part(&self) -> usize;
    /// Soft deletion, pending until the layer is saved.
    fn is_deleted(&self) -> bool;
    /// Geometry of the wrapped part.
    fn geometry(&self) -> Option<Geometry>;
    fn attribute(&self, name: &str) -> Option<FieldValue>;
    fn attributes(&self) -> BTreeMap<String, FieldValue>;
    fn set_attribute(&self, name: &str, value: FieldValue);
}

/// One part of a staged record.
#[derive(Debug, Clone)]
pub struct RecordHandle {
    shared: SharedRecord,
    part: usize,
}

impl RecordHandle {
    pub(crate) fn shared(&self) -> &SharedRecord {
        &self.shared
    }

    /// Soft deletes this part only; the record goes with its last part.
    pub(crate) fn mark_removed(&self) {
        self.shared.borrow_mut().remove_part(self.part);
    }

    /// Replaces the wrapped part, or the whole geometry when the record does
    /// not hold a matching multi geometry.
    fn replace_part(&self, geometry: Geometry) {
        let part = self.part;
        let mut staged = self.shared.borrow_mut();
        let staged = &mut *staged;
        match (&mut staged.record.geometry, geometry) {
            (Some(Geometry::MultiPoint(multi)), Geometry::Point(point))
                if part < multi.0.len() =>
            {
                multi.0[part] = point;
            }
            (Some(Geometry::MultiLineString(multi)), Geometry::LineString(line))
                if part < multi.0.len() =>
            {
                multi.0[part] = line;
            }
            (Some(Geometry::MultiPolygon(multi)), Geometry::Polygon(polygon))
                if part < multi.0.len() =>
            {
                multi.0[part] = polygon;
            }
            (slot, geometry) => {
                *slot = Some(geometry);
                staged.removed_parts.clear();
            }
        }
        staged.edited = true;
    }
}

impl FeatureAccess for RecordHandle {
    fn id(&self) -> FeatureId {
        self.shared.borrow().record.id
    }

    fn part(&self) -> usize {
        self.part
    }

    fn is_deleted(&self) -> bool {
        self.shared.borrow().is_part_removed(self.part)
    }

    fn geometry(&self) -> Option<Geometry> {
        let staged = self.shared.borrow();
        match staged.record.geometry.as_ref()? {
            Geometry::MultiPoint(multi) => multi.0.get(self.part).cloned().map(Geometry::Point),
            Geometry::MultiLineString(multi) => {
                multi.0.get(self.part).cloned().map(Geometry::LineString)
            }
            Geometry::MultiPolygon(multi) => {
                multi.0.get(self.part).cloned().map(Geometry::Polygon)
            }
            geometry => Some(geometry.clone()),
        }
    }

    fn attribute(&self, name: &str) -> Option<FieldValue> {
        self.shared.borrow().record.fields.get(name).cloned()
    }

    fn attributes(&self) -> BTreeMap<String, FieldValue> {
        self.shared.borrow().record.fields.clone()
    }

    fn set_attribute(&self, name: &str, value: FieldValue) {
        let mut staged = self.shared.borrow_mut();
        staged.record.fields.insert(name.to_string(), value);
        staged.edited = true;
    }
}

/// Record without geometry, or with one that is not a point, line or polygon.
#[derive(Shrinkwrap, Delegate, Debug, Clone)]
#[delegate(FeatureAccess)]
pub struct GenericFeature(RecordHandle);

impl GenericFeature {
    pub fn set_geometry(&self, geometry: Geometry) {
        self.0.replace_part(geometry);
    }
}

#[derive(Shrinkwrap, Delegate, Debug, Clone)]
#[delegate(FeatureAccess)]
pub struct PointFeature(RecordHandle);

impl PointFeature {
    pub fn point(&self) -> Option<Point> {
        match self.geometry()? {
            Geometry::Point(point) => Some(point),
            _ => None,
        }
    }

    pub fn set_point(&self, point: Point) {
        self.0.replace_part(Geometry::Point(point));
    }
}

#[derive(Shrinkwrap, Delegate, Debug, Clone)]
#[delegate(FeatureAccess)]
pub struct LineFeature(RecordHandle);

impl LineFeature {
    pub fn line(&self) -> Option<LineString> {
        match self.geometry()? {
            Geometry::LineString(line) => Some(line),
            _ => None,
        }
    }

    pub fn set_line(&self, line: LineString) {
        self.0.replace_part(Geometry::LineString(line));
    }
}

#[derive(Shrinkwrap, Delegate, Debug, Clone)]
#[delegate(FeatureAccess)]
pub struct PolygonFeature(RecordHandle);

impl PolygonFeature {
    pub fn polygon(&self) -> Option<Polygon> {
        match self.geometry()? {
            Geometry::Polygon(polygon) => Some(polygon),
            _ => None,
        }
    }

    pub fn set_polygon(&self, polygon: Polygon) {
        self.0.replace_part(Geometry::Polygon(polygon));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Generic,
    Point,
    Line,
    Polygon,
}

#[derive(Delegate, Debug, Clone)]
#[delegate(FeatureAccess)]
pub enum Feature {
    Generic(GenericFeature),
    Point(PointFeature),
    Line(LineFeature),
    Polygon(PolygonFeature),
}

impl Feature {
    /// One feature per part of `shared` not removed on its own, in part order.
    pub(crate) fn parts(shared: &SharedRecord) -> Vec<Feature> {
        let handle = |part| RecordHandle {
            shared: Rc::clone(shared),
            part,
        };
        let staged = shared.borrow();
        let removed = &staged.removed_parts;
        let members = |len: usize| (0..len).filter(move |part| !removed.contains(part));
        match staged.record.geometry.as_ref() {
            Some(Geometry::Point(_)) => vec![Feature::Point(PointFeature(handle(0)))],
            Some(Geometry::LineString(_)) => vec![Feature::Line(LineFeature(handle(0)))],
            Some(Geometry::Polygon(_)) => vec![Feature::Polygon(PolygonFeature(handle(0)))],
            Some(Geometry::MultiPoint(multi)) if !multi.0.is_empty() => members(multi.0.len())
                .map(|part| Feature::Point(PointFeature(handle(part))))
                .collect(),
            Some(Geometry::MultiLineString(multi)) if !multi.0.is_empty() => {
                members(multi.0.len())
                    .map(|part| Feature::Line(LineFeature(handle(part))))
                    .collect()
            }
            Some(Geometry::MultiPolygon(multi)) if !multi.0.is_empty() => {
                members(multi.0.len())
                    .map(|part| Feature::Polygon(PolygonFeature(handle(part))))
                    .collect()
            }
            _ => vec![Feature::Generic(GenericFeature(handle(0)))],
        }
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Feature::Generic(_) => GeometryKind::Generic,
            Feature::Point(_) => GeometryKind::Point,
            Feature::Line(_) => GeometryKind::Line,
            Feature::Polygon(_) => GeometryKind::Polygon,
        }
    }

    pub(crate) fn handle(&self) -> &RecordHandle {
        match self {
            Feature::Generic(feature) => &feature.0,
            Feature::Point(feature) => &feature.0,
            Feature::Line(feature) => &feature.0,
            Feature::Polygon(feature) => &feature.0,
        }
    }

    /// Whether both wrap the same part of the same staged record.
    pub fn same_record(&self, other: &Feature) -> bool {
        Rc::ptr_eq(self.handle().shared(), other.handle().shared()) && self.part() == other.part()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::vector::record::{FeatureRecord, StagedRecord};
    use geo::{
        line_string, point, polygon, Geometry, GeometryCollection, MultiLineString, MultiPoint,
    };
    use rstest::rstest;

    fn staged(geometry: Option<Geometry>) -> SharedRecord {
        StagedRecord::stored(FeatureRecord::new(3, geometry).with_field("name", "gate"))
    }

    #[rstest]
    #[case::none(None, GeometryKind::Generic)]
    #[case::point(Some(Geometry::Point(point!(x: 1.0, y: 2.0))), GeometryKind::Point)]
    #[case::line(
        Some(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)])),
        GeometryKind::Line
    )]
    #[case::polygon(
        Some(Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)])),
        GeometryKind::Polygon
    )]
    #[case::collection(
        Some(Geometry::GeometryCollection(GeometryCollection::default())),
        GeometryKind::Generic
    )]
    fn dispatches_on_geometry(#[case] geometry: Option<Geometry>, #[case] kind: GeometryKind) {
        let parts = Feature::parts(&staged(geometry));
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].kind(), kind);
        assert_eq!(parts[0].id(), 3);
        assert_eq!(parts[0].part(), 0);
    }

    #[test]
    fn multi_geometries_split_into_parts() {
        let multi = MultiPoint::new(vec![point!(x: 0.0, y: 0.0), point!(x: 5.0, y: 5.0)]);
        let parts = Feature::parts(&staged(Some(Geometry::MultiPoint(multi))));
        assert_eq!(parts.len(), 2);
        let Feature::Point(second) = &parts[1] else {
            panic!("expected a point feature");
        };
        assert_eq!(second.point(), Some(point!(x: 5.0, y: 5.0)));
        assert!(!parts[0].same_record(&parts[1]));
        assert!(parts[1].same_record(&parts[1].clone()));
    }

    #[test]
    fn empty_multi_geometry_is_generic() {
        let empty = MultiLineString::<f64>::new(vec![]);
        let parts = Feature::parts(&staged(Some(Geometry::MultiLineString(empty))));
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].kind(), GeometryKind::Generic);
    }

    #[test]
    fn setting_a_part_keeps_the_others() {
        let lines = MultiLineString::new(vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
            line_string![(x: 0.0, y: 1.0), (x: 1.0, y: 1.0)],
        ]);
        let shared = staged(Some(Geometry::MultiLineString(lines)));
        let parts = Feature::parts(&shared);
        let Feature::Line(first) = &parts[0] else {
            panic!("expected a line feature");
        };
        first.set_line(line_string![(x: 9.0, y: 9.0), (x: 8.0, y: 8.0)]);

        assert!(shared.borrow().edited);
        let Some(Geometry::MultiLineString(stored)) = shared.borrow().record.geometry.clone() else {
            panic!("expected a multi line string");
        };
        assert_eq!(stored.0[0], line_string![(x: 9.0, y: 9.0), (x: 8.0, y: 8.0)]);
        assert_eq!(stored.0[1], line_string![(x: 0.0, y: 1.0), (x: 1.0, y: 1.0)]);
    }

    #[test]
    fn attributes_are_shared_between_handles() {
        let shared = staged(None);
        let feature = Feature::parts(&shared).remove(0);
        let again = Feature::parts(&shared).remove(0);
        assert_eq!(feature.attribute("name"), Some(FieldValue::from("gate")));

        again.set_attribute("height", FieldValue::Real(2.5));
        assert_eq!(feature.attribute("height"), Some(FieldValue::Real(2.5)));
        assert_eq!(feature.attributes().len(), 2);
        assert!(feature.same_record(&again));

        feature.handle().mark_removed();
        assert!(again.is_deleted());
    }

    #[test]
    fn removed_part_is_no_longer_listed() {
        let wells = MultiPoint::new(vec![point!(x: 0.0, y: 0.0), point!(x: 5.0, y: 5.0)]);
        let shared = staged(Some(Geometry::MultiPoint(wells)));
        let parts = Feature::parts(&shared);
        parts[0].handle().mark_removed();

        assert!(parts[0].is_deleted());
        assert!(!parts[1].is_deleted());
        let remaining = Feature::parts(&shared);
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].same_record(&parts[1]));
        assert_eq!(remaining[0].geometry(), Some(Geometry::Point(point!(x: 5.0, y: 5.0))));
    }

    #[test]
    fn generic_feature_takes_any_geometry() {
        let shared = staged(None);
        let Feature::Generic(feature) = Feature::parts(&shared).remove(0) else {
            panic!("expected a generic feature");
        };
        feature.set_geometry(Geometry::Point(point!(x: 4.0, y: 2.0)));
        assert_eq!(feature.geometry(), Some(Geometry::Point(point!(x: 4.0, y: 2.0))));
        assert_eq!(Feature::parts(&shared)[0].kind(), GeometryKind::Point);
    }
}
