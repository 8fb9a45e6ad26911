use gdal::{config::set_config_option, Dataset as GdalDataset};
use log::debug;
use ndarray::Array2;
use url::Url;

use crate::{
    components::{
        bounds::PixelBounds,
        source::{DType, DataType, RasterInfo, RasterSource},
        transforms::{GeoTransform, GridSpec},
    },
    crs_geo::Crs,
    errors::{Result, StacrioError},
};

/// Options making remote cloud optimized GeoTIFFs cheap to open.
const GDAL_OPTIONS: [(&str, &str); 3] = [
    ("GDAL_DISABLE_READDIR_ON_OPEN", "EMPTY_DIR"),
    ("CPL_VSIL_CURL_ALLOWED_EXTENSIONS", ".tif,.TIF,.tiff,.TIFF"),
    ("GDAL_HTTP_MERGE_CONSECUTIVE_RANGES", "YES"),
];

/// Process wide gdal configuration, see [crate::init].
pub(crate) fn configure() -> Result<()> {
    for (key, value) in GDAL_OPTIONS {
        set_config_option(key, value)?;
    }
    debug!("gdal configured");
    Ok(())
}

/// Reads rasters through gdal, remote hrefs via its virtual file systems.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalSource;

impl GdalSource {
    pub fn new() -> Self {
        Self
    }

    /// Gdal path of an href: `/vsicurl/` for http(s), `/vsis3/` for s3.
    pub fn gdal_path(href: &str) -> String {
        match Url::parse(href) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => format!("/vsicurl/{href}"),
            Ok(url) if url.scheme() == "s3" => {
                format!("/vsis3/{}{}", url.host_str().unwrap_or_default(), url.path())
            }
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(_) => href.into(),
            },
            _ => href.into(),
        }
    }

    fn open(href: &str) -> Result<GdalDataset> {
        let path = Self::gdal_path(href);
        debug!("opening {path}");
        Ok(GdalDataset::open(&path)?)
    }
}

impl RasterSource for GdalSource {
    fn describe(&self, href: &str) -> Result<RasterInfo> {
        let dataset = Self::open(href)?;
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let epsg = dataset.spatial_ref()?.auth_code()?;
        let crs = u32::try_from(epsg)
            .map_err(|_| StacrioError::InvalidCrs(epsg.to_string()))
            .and_then(Crs::from_epsg)?;
        let grid = GridSpec::new(transform, dataset.raster_size(), crs, href)?;
        let band = dataset.rasterband(1)?;
        Ok(RasterInfo {
            grid,
            dtype: DType::from_gdal_name(&band.band_type().name())?,
            nodata: band.no_data_value(),
        })
    }

    fn read_window<T: DataType>(&self, href: &str, window: &PixelBounds) -> Result<Array2<T>> {
        let dataset = Self::open(href)?;
        let band = dataset.rasterband(1)?;
        let (column, row) = window.offset();
        let offset = (
            isize::try_from(column).map_err(|_| StacrioError::Uncastable)?,
            isize::try_from(row).map_err(|_| StacrioError::Uncastable)?,
        );
        let (width, height) = window.shape();
        let mut pixels = vec![T::zero(); width * height];
        band.read_into_slice::<T>(offset, (width, height), (width, height), &mut pixels, None)?;
        Ok(Array2::from_shape_vec((height, width), pixels)?)
    }
}
