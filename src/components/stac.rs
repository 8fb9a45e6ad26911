//! Serde models of the STAC documents read by the catalog reader.
//!
//! Only the fields the pipeline looks at are typed, everything else is kept
//! in `extra` maps so documents round trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StacKind {
    Catalog,
    Collection,
    Feature,
    FeatureCollection,
}

/// Any STAC document: catalog, collection, item or item collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StacDocument {
    #[serde(rename = "type")]
    pub kind: StacKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, Asset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Value>,
    #[serde(
        default,
        rename = "conformsTo",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub conforms_to: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub merge: bool,
}

impl Link {
    pub fn is_child(&self) -> bool {
        matches!(self.rel.as_str(), "child" | "item")
    }

    pub fn is_post(&self) -> bool {
        self.method
            .as_deref()
            .is_some_and(|method| method.eq_ignore_ascii_case("POST"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, rename = "eo:bands", skip_serializing_if = "Vec::is_empty")]
    pub eo_bands: Vec<EoBand>,
    #[serde(default, rename = "raster:bands", skip_serializing_if = "Vec::is_empty")]
    pub raster_bands: Vec<RasterBandInfo>,
    /// `[rows, columns]`
    #[serde(default, rename = "proj:shape", skip_serializing_if = "Option::is_none")]
    pub proj_shape: Option<[usize; 2]>,
    #[serde(default, rename = "proj:transform", skip_serializing_if = "Option::is_none")]
    pub proj_transform: Option<Vec<f64>>,
    #[serde(default, rename = "proj:epsg", skip_serializing_if = "Option::is_none")]
    pub proj_epsg: Option<u32>,
    #[serde(default, rename = "proj:code", skip_serializing_if = "Option::is_none")]
    pub proj_code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Asset {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            media_type: None,
            title: None,
            description: None,
            roles: Vec::new(),
            eo_bands: Vec::new(),
            raster_bands: Vec::new(),
            proj_shape: None,
            proj_transform: None,
            proj_epsg: None,
            proj_code: None,
            extra: Map::new(),
        }
    }

    /// Whether the asset holds raster pixels rather than metadata/thumbnails.
    pub fn is_raster(&self) -> bool {
        let tiff = self
            .media_type
            .as_deref()
            .is_some_and(|media_type| media_type.starts_with("image/tiff"));
        tiff || !self.eo_bands.is_empty() || !self.raster_bands.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EoBand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_wavelength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_width_half_max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RasterBandInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_resolution: Option<f64>,
}
