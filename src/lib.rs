//! Access layer over geospatial datasets.
//!
//! A [Dataset] hands out [RasterLayer]s, which cut metrically sized tiles out
//! of rasters, and [FeatureLayer]s, which expose typed vector features with
//! spatial and identity queries. Stores are reached through the traits in
//! [backends]; GDAL and an in-memory store ship with the crate.

#[macro_use]
extern crate shrinkwraprs;

mod components;
mod errors;
mod intersection;
mod options;

pub use components::{
    backends, Dataset, Extent, Feature, FeatureAccess, FeatureEvent, FeatureId, FeatureLayer,
    FeatureRecord, FieldValue, GenericFeature, GeometryKind, Image, Interpolation, LineFeature,
    PixelData, PointFeature, PolygonFeature, RasterFormat, RasterLayer, VALUE_SENTINEL,
};
pub use errors::{GeodataError, Result};
pub use options::Options;
