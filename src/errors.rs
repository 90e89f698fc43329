pub type Result<T> = std::result::Result<T, GeodataError>;

#[derive(thiserror::Error, Debug)]
pub enum GeodataError {
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ConfigError(#[from] serde_json::Error),
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error("Dataset at '{0}' is not valid")]
    InvalidDataset(String),
    #[error("No layer named '{0}' in dataset")]
    LayerNotFound(String),
    #[error("No valid data available in layer '{layer}' at the requested position")]
    NoDataAvailable { layer: String },
    #[error("Layer '{layer}' was not opened with write access")]
    WriteAccessViolation { layer: String },
    #[error("Raster format {0:?} has no defined decoding")]
    UnsupportedFormat(crate::components::RasterFormat),
    #[error("Invalid extraction window: {0}")]
    InvalidWindow(String),
    #[error("Geo transform is not invertible")]
    NotInvertible,
    #[error("There is no intersection between geometries")]
    NoIntersection,
}
