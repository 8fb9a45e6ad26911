use crate::components::DataTypeTag;

pub type Result<T> = std::result::Result<T, StacrioError>;

#[derive(thiserror::Error, Debug)]
pub enum StacrioError {
    #[error("could not access catalog at {url}: {reason}")]
    CatalogAccess { url: String, reason: String },
    #[error("entry {entry:?} has no band named {band:?}")]
    MissingBand { entry: String, band: String },
    #[error("entry {entry:?} has no acquisition timestamp")]
    MissingTimestamp { entry: String },
    #[error("bbox {bbox:?} does not intersect the footprint of {entry:?}")]
    EmptyIntersection { entry: String, bbox: [f64; 4] },
    #[error("nothing to stack: {0}")]
    EmptySelection(String),
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid bbox {0:?}")]
    InvalidBbox(String),
    #[error("invalid datetime interval {0:?}")]
    InvalidDatetime(String),
    #[error("invalid attribute filter {0:?}")]
    InvalidFilter(String),
    #[error("invalid crs {0:?}")]
    InvalidCrs(String),
    #[error("entries {first:?} ({first_crs}) and {second:?} ({second_crs}) do not share a crs")]
    CrsMismatch {
        first: String,
        first_crs: String,
        second: String,
        second_crs: String,
    },
    #[error("no reader for endpoint {url} (recognized as {tag:?})")]
    UnsupportedEndpoint {
        url: String,
        tag: Option<DataTypeTag>,
    },
    #[error("unsupported raster grid for {0:?}: only north-up grids can be read")]
    UnsupportedGrid(String),
    #[error("unsupported data type {0:?}")]
    UnsupportedDataType(String),
    #[error("{dim} has {labels} labels but length {length}")]
    ShapeMismatch {
        dim: String,
        labels: usize,
        length: usize,
    },
    #[error("could not render array: {0}")]
    Render(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("Value could not be cast")]
    Uncastable,
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    ProjError(#[from] proj::ProjError),
    #[error(transparent)]
    ProjCreateError(#[from] proj::ProjCreateError),
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    YamlError(#[from] serde_yaml::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
