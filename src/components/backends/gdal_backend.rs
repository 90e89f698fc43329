//! Implementations for gdal

use gdal::{
    raster::{Buffer, GdalDataType},
    vector::{
        Feature as GdalFeature, FieldValue as GdalFieldValue, LayerAccess, LayerOptions,
        OGRFieldType, OGRwkbGeometryType, ToGdal,
    },
    Dataset as GdalDataset, DatasetOptions, GdalOpenFlags, Metadata as GdalMetadata,
};
use geo::Rect;
use log::{debug, info, warn};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    components::{
        backends::{ChangeSet, NativeDataset, NativeLayer, NativeRaster, SampleType},
        transforms::GeoTransformArray,
        vector::record::{FeatureId, FeatureRecord, FieldValue},
    },
    errors::{GeodataError, Result},
};

pub fn open<P: AsRef<Path>>(path: P, write_access: bool) -> Result<GdalStore> {
    let open_flags = if write_access {
        GdalOpenFlags::GDAL_OF_UPDATE
    } else {
        GdalOpenFlags::GDAL_OF_READONLY
    };
    let options = DatasetOptions {
        open_flags,
        ..Default::default()
    };
    let dataset = GdalDataset::open_ex(path.as_ref(), options)?;
    info!(
        "opened {:?} with driver {}",
        path.as_ref(),
        dataset.driver().short_name()
    );
    let subdatasets = subdatasets(&dataset);
    Ok(GdalStore {
        path: path.as_ref().to_path_buf(),
        dataset: Rc::new(dataset),
        write_access,
        subdatasets,
    })
}

/// Layer name of a subdataset descriptor such as `GPKG:/data/a.gpkg:dem`.
fn subdataset_name(descriptor: &str) -> String {
    descriptor
        .rsplit(':')
        .next()
        .unwrap_or(descriptor)
        .trim_matches('"')
        .to_string()
}

fn subdatasets(dataset: &GdalDataset) -> BTreeMap<String, String> {
    dataset
        .metadata_domain("SUBDATASETS")
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            key.ends_with("_NAME")
                .then(|| (subdataset_name(value), value.to_string()))
        })
        .collect()
}

fn sample_type_from_gdal(band_type: GdalDataType) -> SampleType {
    match band_type {
        GdalDataType::UInt8 => SampleType::Byte,
        GdalDataType::Int8
        | GdalDataType::UInt16
        | GdalDataType::Int16
        | GdalDataType::UInt32
        | GdalDataType::Int32
        | GdalDataType::UInt64
        | GdalDataType::Int64 => SampleType::Integer,
        GdalDataType::Float32 | GdalDataType::Float64 => SampleType::Float,
        _ => SampleType::Unknown,
    }
}

#[derive(Debug)]
pub struct GdalStore {
    path: PathBuf,
    dataset: Rc<GdalDataset>,
    write_access: bool,
    /// Layer name to subdataset descriptor.
    subdatasets: BTreeMap<String, String>,
}

impl GdalStore {
    fn own_raster_name(&self) -> Option<String> {
        (self.dataset.raster_count() > 0).then(|| {
            self.path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}

impl NativeDataset for GdalStore {
    fn raster_layer_names(&self) -> Vec<String> {
        self.own_raster_name()
            .into_iter()
            .chain(self.subdatasets.keys().cloned())
            .collect()
    }

    fn feature_layer_names(&self) -> Vec<String> {
        self.dataset.layers().map(|layer| layer.name()).collect()
    }

    fn raster(&self, name: &str) -> Result<Box<dyn NativeRaster>> {
        if self.own_raster_name().as_deref() == Some(name) {
            return Ok(Box::new(GdalRaster(Rc::clone(&self.dataset))));
        }
        let descriptor = self
            .subdatasets
            .get(name)
            .ok_or_else(|| GeodataError::LayerNotFound(name.to_string()))?;
        let store = open(descriptor, self.write_access)?;
        Ok(Box::new(GdalRaster(store.dataset)))
    }

    fn layer(&self, name: &str) -> Result<Box<dyn NativeLayer>> {
        self.dataset.layer_by_name(name)?;
        Ok(Box::new(GdalLayer {
            dataset: Rc::clone(&self.dataset),
            name: name.to_string(),
        }))
    }
}

#[derive(Debug)]
struct GdalRaster(Rc<GdalDataset>);

impl NativeRaster for GdalRaster {
    fn size(&self) -> (usize, usize) {
        self.0.raster_size()
    }

    fn band_count(&self) -> usize {
        self.0.raster_count()
    }

    fn sample_type(&self) -> SampleType {
        self.0
            .rasterband(1)
            .map(|band| sample_type_from_gdal(band.band_type()))
            .unwrap_or(SampleType::Unknown)
    }

    fn geo_transform(&self) -> Result<GeoTransformArray> {
        Ok(self.0.geo_transform()?)
    }

    fn no_data_value(&self) -> Option<f64> {
        self.0.rasterband(1).ok()?.no_data_value()
    }

    fn read_window(
        &self,
        band: usize,
        offset: (usize, usize),
        window_size: (usize, usize),
        buffer_size: (usize, usize),
    ) -> Result<Vec<f64>> {
        let rasterband = self.0.rasterband(band + 1)?;
        let buffer = rasterband.read_as::<f64>(
            (offset.0 as isize, offset.1 as isize),
            window_size,
            buffer_size,
            None,
        )?;
        Ok(buffer.data().to_vec())
    }

    fn write_window(
        &mut self,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
        data: &[f64],
    ) -> Result<()> {
        let mut rasterband = self.0.rasterband(band + 1)?;
        let mut buffer = Buffer::new(size, data.to_vec());
        rasterband.write((offset.0 as isize, offset.1 as isize), size, &mut buffer)?;
        Ok(())
    }
}

fn field_from_gdal(value: GdalFieldValue) -> Option<FieldValue> {
    match value {
        GdalFieldValue::IntegerValue(value) => Some(FieldValue::Integer(value.into())),
        GdalFieldValue::Integer64Value(value) => Some(FieldValue::Integer(value)),
        GdalFieldValue::RealValue(value) => Some(FieldValue::Real(value)),
        GdalFieldValue::StringValue(value) => Some(FieldValue::String(value)),
        other => other.into_string().map(FieldValue::String),
    }
}

fn field_to_gdal(value: &FieldValue) -> GdalFieldValue {
    match value {
        FieldValue::Integer(value) => GdalFieldValue::Integer64Value(*value),
        FieldValue::Real(value) => GdalFieldValue::RealValue(*value),
        FieldValue::String(value) => GdalFieldValue::StringValue(value.clone()),
    }
}

fn record_from_gdal(feature: &GdalFeature) -> FeatureRecord {
    let id = feature.fid().unwrap_or_default();
    let geometry = feature.geometry().and_then(|geometry| {
        geometry
            .to_geo()
            .map_err(|error| warn!("feature {id} has an unreadable geometry: {error}"))
            .ok()
    });
    let fields = feature
        .fields()
        .filter_map(|(name, value)| value.and_then(field_from_gdal).map(|value| (name, value)))
        .collect();
    FeatureRecord {
        id,
        geometry,
        fields,
    }
}

fn fill_gdal_feature(feature: &mut GdalFeature, record: &FeatureRecord) -> Result<()> {
    if let Some(geometry) = &record.geometry {
        feature.set_geometry(geometry.to_gdal()?)?;
    }
    for (name, value) in &record.fields {
        match feature.field_index(name) {
            Ok(index) => feature.set_field(index, &field_to_gdal(value))?,
            Err(_) => warn!("layer has no field '{name}', value of feature {} dropped", record.id),
        }
    }
    unsafe {
        gdal_sys::OGR_F_SetFID(feature.c_feature(), record.id as i64);
    }
    Ok(())
}

fn check_ogr(err: gdal_sys::OGRErr::Type, method_name: &'static str) -> Result<()> {
    if err != gdal_sys::OGRErr::OGRERR_NONE {
        return Err(gdal::errors::GdalError::OgrError { err, method_name }.into());
    }
    Ok(())
}

#[derive(Debug)]
struct GdalLayer {
    dataset: Rc<GdalDataset>,
    name: String,
}

impl NativeLayer for GdalLayer {
    fn records(&self) -> Result<Vec<FeatureRecord>> {
        let mut layer = self.dataset.layer_by_name(&self.name)?;
        Ok(layer
            .features()
            .map(|feature| record_from_gdal(&feature))
            .collect())
    }

    fn record(&self, id: FeatureId) -> Result<Option<FeatureRecord>> {
        let layer = self.dataset.layer_by_name(&self.name)?;
        Ok(layer.feature(id).map(|feature| record_from_gdal(&feature)))
    }

    fn records_in_rect(&self, rect: Rect) -> Result<Vec<FeatureRecord>> {
        let mut layer = self.dataset.layer_by_name(&self.name)?;
        layer.set_spatial_filter_rect(rect.min().x, rect.min().y, rect.max().x, rect.max().y);
        let records = layer
            .features()
            .map(|feature| record_from_gdal(&feature))
            .collect();
        layer.clear_spatial_filter();
        Ok(records)
    }

    fn allocate_id(&self) -> Result<FeatureId> {
        let mut layer = self.dataset.layer_by_name(&self.name)?;
        Ok(layer
            .features()
            .filter_map(|feature| feature.fid())
            .max()
            .map_or(0, |last| last + 1))
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<()> {
        let layer = self.dataset.layer_by_name(&self.name)?;
        for id in &changes.deleted {
            let err = unsafe { gdal_sys::OGR_L_DeleteFeature(layer.c_layer(), *id as i64) };
            check_ogr(err, "OGR_L_DeleteFeature")?;
        }
        for record in &changes.updated {
            let Some(mut feature) = layer.feature(record.id) else {
                warn!("feature {} vanished from layer '{}', recreating it", record.id, self.name);
                let mut feature = GdalFeature::new(layer.defn())?;
                fill_gdal_feature(&mut feature, record)?;
                feature.create(&layer)?;
                continue;
            };
            fill_gdal_feature(&mut feature, record)?;
            let err = unsafe { gdal_sys::OGR_L_SetFeature(layer.c_layer(), feature.c_feature()) };
            check_ogr(err, "OGR_L_SetFeature")?;
        }
        for record in &changes.created {
            let mut feature = GdalFeature::new(layer.defn())?;
            fill_gdal_feature(&mut feature, record)?;
            feature.create(&layer)?;
        }
        let err = unsafe { gdal_sys::OGR_L_SyncToDisk(layer.c_layer()) };
        check_ogr(err, "OGR_L_SyncToDisk")?;
        debug!(
            "layer '{}': {} created, {} updated, {} deleted",
            self.name,
            changes.created.len(),
            changes.updated.len(),
            changes.deleted.len()
        );
        Ok(())
    }

    fn write_copy(&self, path: &Path, records: &[FeatureRecord]) -> Result<()> {
        let source = self.dataset.layer_by_name(&self.name)?;
        let srs = source.spatial_ref();
        let fields: Vec<(String, OGRFieldType::Type)> = source
            .defn()
            .fields()
            .map(|field| (field.name(), field.field_type()))
            .collect();

        let mut copy = self.dataset.driver().create_vector_only(path)?;
        let layer = copy.create_layer(LayerOptions {
            name: &self.name,
            srs: srs.as_ref(),
            ty: OGRwkbGeometryType::wkbUnknown,
            options: None,
        })?;
        let field_defs: Vec<(&str, OGRFieldType::Type)> = fields
            .iter()
            .map(|(name, field_type)| (name.as_str(), *field_type))
            .collect();
        layer.create_defn_fields(&field_defs)?;
        for record in records {
            let mut feature = GdalFeature::new(layer.defn())?;
            fill_gdal_feature(&mut feature, record)?;
            feature.create(&layer)?;
        }
        info!("wrote {} features of '{}' to {:?}", records.len(), self.name, path);
        Ok(())
    }
}
