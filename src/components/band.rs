use crate::components::stac::Asset;

/// Named 2D raster slice of an entry.
///
/// Built from an asset, its first `eo:bands`/`raster:bands` entries carry
/// the spectral and sample descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub name: String,
    pub asset_key: String,
    pub common_name: Option<String>,
    pub description: Option<String>,
    /// Micrometers.
    pub center_wavelength: Option<f64>,
    pub full_width_half_max: Option<f64>,
    pub href: String,
    pub nodata: Option<f64>,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
    pub asset: Asset,
}

impl Band {
    pub fn from_asset(name: &str, asset_key: &str, asset: Asset) -> Self {
        let eo_band = asset.eo_bands.first().cloned().unwrap_or_default();
        let raster_band = asset.raster_bands.first().cloned().unwrap_or_default();
        Self {
            name: name.into(),
            asset_key: asset_key.into(),
            common_name: eo_band.common_name,
            description: eo_band
                .description
                .or_else(|| asset.title.clone())
                .or_else(|| asset.description.clone()),
            center_wavelength: eo_band.center_wavelength,
            full_width_half_max: eo_band.full_width_half_max,
            href: asset.href.clone(),
            nodata: raster_band.nodata,
            scale: raster_band.scale,
            offset: raster_band.offset,
            asset,
        }
    }

    /// Whether `name` refers to this asset, by key, band name or common name.
    pub fn answers_to(asset_key: &str, asset: &Asset, name: &str) -> bool {
        asset_key == name
            || asset.eo_bands.iter().any(|band| {
                band.common_name.as_deref() == Some(name) || band.name.as_deref() == Some(name)
            })
    }
}
