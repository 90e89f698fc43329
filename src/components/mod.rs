pub mod backends;
pub mod bounds;
pub mod dataset;
pub mod extractor;
pub mod raster;
pub mod transforms;
pub mod vector;

pub use bounds::Extent;
pub use dataset::Dataset;
pub use raster::{Image, Interpolation, PixelData, RasterFormat, RasterLayer, VALUE_SENTINEL};
pub use vector::{
    feature::{
        Feature, FeatureAccess, GenericFeature, GeometryKind, LineFeature, PointFeature,
        PolygonFeature,
    },
    record::{FeatureId, FeatureRecord, FieldValue},
    FeatureEvent, FeatureLayer,
};
