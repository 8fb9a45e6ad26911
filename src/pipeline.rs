//! Forward only orchestration of the stages.
//!
//! Each stage consumes the previous one, so a run can be stopped between
//! stages but never revisit one.

use log::info;

use crate::{
    components::{
        array::{DataArray, LazyArray, Materializer},
        bounds::Bbox,
        catalog::{CatalogEntry, CatalogReader},
        endpoint::CatalogEndpoint,
        render::{RenderedImage, Renderer},
        search::Search,
        source::{DataType, RasterSource},
    },
    errors::{Result, StacrioError},
};

/// What to turn into an array once items are found.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub bands: Vec<String>,
    pub clip: Option<Bbox>,
    /// Stack every found item along time instead of taking one.
    pub time_stack: bool,
    /// Item used without `time_stack`, in search order.
    pub index: usize,
}

impl Selection {
    pub fn new<S: Into<String>>(bands: impl IntoIterator<Item = S>) -> Self {
        Self {
            bands: bands.into_iter().map(Into::into).collect(),
            clip: None,
            time_stack: false,
            index: 0,
        }
    }

    pub fn with_clip(mut self, clip: Bbox) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn with_time_stack(mut self) -> Self {
        self.time_stack = true;
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

#[derive(Debug)]
pub struct Pipeline {
    reader: CatalogReader,
}

impl Pipeline {
    pub fn new(reader: CatalogReader) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &CatalogReader {
        &self.reader
    }

    /// Resolves `url` from its text, reading the document behind it when
    /// the text is not recognized.
    pub fn resolve(&self, url: &str) -> Result<Resolved<'_>> {
        let endpoint = CatalogEndpoint::discover(self.reader.fetcher(), url)?;
        info!("resolved {endpoint}");
        Ok(self.with_endpoint(endpoint))
    }

    /// Skips resolution for an endpoint with a known tag.
    pub fn with_endpoint(&self, endpoint: CatalogEndpoint) -> Resolved<'_> {
        Resolved {
            reader: &self.reader,
            endpoint,
        }
    }
}

#[derive(Debug)]
pub struct Resolved<'p> {
    reader: &'p CatalogReader,
    endpoint: CatalogEndpoint,
}

impl<'p> Resolved<'p> {
    pub fn endpoint(&self) -> &CatalogEndpoint {
        &self.endpoint
    }

    pub fn open(self) -> Result<Opened<'p>> {
        let root = self.reader.open(&self.endpoint)?;
        Ok(Opened {
            reader: self.reader,
            root,
        })
    }
}

#[derive(Debug)]
pub struct Opened<'p> {
    reader: &'p CatalogReader,
    root: CatalogEntry,
}

impl Opened<'_> {
    pub fn root(&self) -> &CatalogEntry {
        &self.root
    }

    pub fn search(self, search: &Search) -> Result<Found> {
        Ok(Found {
            items: search.run(self.reader, &self.root)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Found {
    items: Vec<CatalogEntry>,
}

impl Found {
    pub fn items(&self) -> &[CatalogEntry] {
        &self.items
    }

    pub fn into_items(self) -> Vec<CatalogEntry> {
        self.items
    }

    /// Lazy array of the selection, no pixels are read.
    pub fn materialize<T: DataType, S: RasterSource>(
        &self,
        source: &S,
        selection: &Selection,
    ) -> Result<LazyArray<T>> {
        let bands = selection.bands.iter().map(String::as_str).collect::<Vec<_>>();
        let materializer = Materializer::new(source);
        if selection.time_stack {
            return materializer.stack_time(&self.items, &bands, selection.clip.as_ref());
        }
        let entry = self.items.get(selection.index).ok_or_else(|| {
            StacrioError::EmptySelection(format!(
                "item {} requested but the search found {}",
                selection.index,
                self.items.len()
            ))
        })?;
        materializer.stack_bands(entry, &bands, selection.clip.as_ref())
    }
}

/// Resolves, opens, searches, materializes and realizes `url`.
pub fn realize<T: DataType, S: RasterSource>(
    pipeline: &Pipeline,
    source: &S,
    url: &str,
    search: &Search,
    selection: &Selection,
) -> Result<DataArray<T>> {
    let found = pipeline.resolve(url)?.open()?.search(search)?;
    found.materialize::<T, S>(source, selection)?.realize(source)
}

/// [realize] followed by rendering.
pub fn run<T: DataType, S: RasterSource>(
    pipeline: &Pipeline,
    source: &S,
    url: &str,
    search: &Search,
    selection: &Selection,
    renderer: &Renderer,
) -> Result<RenderedImage> {
    renderer.render(&realize::<T, S>(pipeline, source, url, search, selection)?)
}
