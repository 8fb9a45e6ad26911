pub mod components;
pub mod config;
pub mod crs_geo;
pub mod errors;
pub mod intersection;
pub mod pipeline;

use std::sync::OnceLock;

pub use components::{
    AttributeFilter, Band, Bbox, CatalogEndpoint, CatalogEntry, CatalogReader, DataArray,
    DataTypeTag, EndpointResolver, Interval, LazyArray, Materializer, RasterSource, RenderOptions,
    RenderedImage, Renderer, Search, SearchPredicate, Signer, TokenSigner,
};
pub use config::Config;
pub use crs_geo::{Crs, CrsGeometry};
pub use errors::{Result, StacrioError};

static INIT: OnceLock<()> = OnceLock::new();

/// Process wide setup of the raster engine, later calls are no-ops.
pub fn init() -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }
    components::source::gdal_source::configure()?;
    let _ = INIT.set(());
    Ok(())
}
