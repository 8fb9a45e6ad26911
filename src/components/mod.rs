pub mod array;
pub mod band;
pub mod bounds;
pub mod catalog;
pub mod endpoint;
pub mod fetch;
pub mod render;
pub mod search;
pub mod signing;
pub mod source;
pub mod stac;
pub mod transforms;

pub use array::{Coords, DataArray, LazyArray, Materializer};
pub use band::Band;
pub use bounds::{Bbox, Footprint, GeoBounds, PixelBounds};
pub use catalog::{CatalogEntry, CatalogReader, EntryKind};
pub use endpoint::{CatalogEndpoint, DataTypeTag, EndpointResolver};
pub use fetch::{DefaultFetcher, Fetcher, FileFetcher, HttpFetcher};
pub use render::{Georeference, RenderOptions, RenderedImage, Renderer};
pub use search::{sort_by_datetime, AttributeFilter, Comparison, Interval, Search, SearchPredicate};
pub use signing::{Signer, TokenSigner};
pub use source::{DType, DataType, GdalSource, MemoryRaster, MemorySource, RasterInfo, RasterSource};
pub use stac::Asset;
pub use transforms::{GeoTransform, GridSpec};
