use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use url::Url;

use crate::{
    components::{
        band::Band,
        bounds::Footprint,
        endpoint::{CatalogEndpoint, DataTypeTag},
        fetch::Fetcher,
        signing::Signer,
        stac::{Asset, Link, Properties, StacDocument, StacKind},
    },
    crs_geo::Crs,
    errors::{Result, StacrioError},
};

const ITEM_SEARCH_CONFORMANCE: &str = "item-search";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Catalog,
    Collection,
    Item,
}

fn resolve_href(base: &Url, href: &str) -> Result<Url> {
    base.join(href).map_err(|error| StacrioError::InvalidUrl {
        url: href.into(),
        reason: error.to_string(),
    })
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let text = value?.as_str()?;
    match DateTime::parse_from_rfc3339(text) {
        Ok(datetime) => Some(datetime.with_timezone(&Utc)),
        Err(error) => {
            debug!("ignoring unparseable timestamp {text:?}: {error}");
            None
        }
    }
}

/// Immutable snapshot of a catalog node: catalog, collection or item.
///
/// Asset hrefs are stored unsigned, the reader's signer is applied on each
/// access.
#[derive(Clone)]
pub struct CatalogEntry {
    id: String,
    kind: EntryKind,
    href: Url,
    description: Option<String>,
    collection: Option<String>,
    bbox: Option<Footprint>,
    properties: Properties,
    assets: BTreeMap<String, Asset>,
    links: Vec<Link>,
    conforms_to: Vec<String>,
    signer: Option<Arc<dyn Signer>>,
}

impl Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("href", &self.href.as_str())
            .field("assets", &self.assets.keys().collect::<Vec<_>>())
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl CatalogEntry {
    fn from_document(
        document: StacDocument,
        location: &Url,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self> {
        let kind = match document.kind {
            StacKind::Catalog => EntryKind::Catalog,
            StacKind::Collection => EntryKind::Collection,
            StacKind::Feature => EntryKind::Item,
            StacKind::FeatureCollection => {
                return Err(StacrioError::CatalogAccess {
                    url: location.to_string(),
                    reason: "an item collection is not a catalog entry".into(),
                })
            }
        };
        let id = document.id.ok_or_else(|| StacrioError::CatalogAccess {
            url: location.to_string(),
            reason: "document has no id".into(),
        })?;
        let href = match document.links.iter().find(|link| link.rel == "self") {
            Some(link) => resolve_href(location, &link.href)?,
            None => location.clone(),
        };
        let links = document
            .links
            .into_iter()
            .map(|link| -> Result<Link> {
                Ok(Link {
                    href: resolve_href(&href, &link.href)?.into(),
                    ..link
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let assets = document
            .assets
            .into_iter()
            .map(|(key, asset)| -> Result<(String, Asset)> {
                let resolved = resolve_href(&href, &asset.href)?;
                Ok((
                    key,
                    Asset {
                        href: resolved.into(),
                        ..asset
                    },
                ))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let bbox = document.bbox.as_deref().map(Footprint::from_slice).transpose()?;
        Ok(Self {
            id,
            kind,
            href,
            description: document.description,
            collection: document.collection,
            bbox,
            properties: document.properties,
            assets,
            links,
            conforms_to: document.conforms_to,
            signer,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_item(&self) -> bool {
        self.kind == EntryKind::Item
    }

    /// Location the entry was read from (its `self` link when present).
    pub fn href(&self) -> &Url {
        &self.href
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Geographic footprint (`bbox`) of the entry.
    pub fn footprint(&self) -> Option<&Footprint> {
        self.bbox.as_ref()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Acquisition timestamp: `datetime`, else `start_datetime`.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.property("datetime"))
            .or_else(|| parse_timestamp(self.property("start_datetime")))
    }

    /// Closed acquisition range, a single instant unless the entry declares
    /// `start_datetime`/`end_datetime`.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = parse_timestamp(self.property("start_datetime"));
        let end = parse_timestamp(self.property("end_datetime"));
        match (start, end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => self.datetime().map(|datetime| (datetime, datetime)),
        }
    }

    /// Crs declared in the properties (`proj:epsg` or `proj:code`).
    pub fn crs(&self) -> Result<Option<Crs>> {
        if let Some(epsg) = self.property("proj:epsg").filter(|value| !value.is_null()) {
            return epsg
                .as_u64()
                .and_then(|epsg| u32::try_from(epsg).ok())
                .ok_or_else(|| StacrioError::InvalidCrs(epsg.to_string()))
                .and_then(Crs::from_epsg)
                .map(Some);
        }
        match self.property("proj:code").and_then(Value::as_str) {
            Some(code) => code.parse().map(Some),
            None => Ok(None),
        }
    }

    pub fn asset_keys(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    /// Asset as stored, without signing.
    pub fn raw_asset(&self, key: &str) -> Option<&Asset> {
        self.assets.get(key)
    }

    fn sign(&self, asset: &Asset) -> Result<Asset> {
        match &self.signer {
            Some(signer) => signer.sign(asset),
            None => Ok(asset.clone()),
        }
    }

    /// Asset with its href signed.
    pub fn asset(&self, key: &str) -> Result<Option<Asset>> {
        self.assets
            .get(key)
            .map(|asset| self.sign(asset))
            .transpose()
    }

    /// Band by asset key, else by `eo:bands` name or common name.
    pub fn band(&self, name: &str) -> Result<Band> {
        let found = self.assets.get_key_value(name).or_else(|| {
            self.assets
                .iter()
                .find(|(key, asset)| Band::answers_to(key, asset, name))
        });
        match found {
            Some((key, asset)) => Ok(Band::from_asset(name, key, self.sign(asset)?)),
            None => Err(StacrioError::MissingBand {
                entry: self.id.clone(),
                band: name.into(),
            }),
        }
    }

    /// All raster bands of the entry, in asset key order.
    pub fn bands(&self) -> Result<Vec<Band>> {
        self.assets
            .iter()
            .filter(|(_, asset)| asset.is_raster())
            .map(|(key, asset)| -> Result<Band> {
                Ok(Band::from_asset(key, key, self.sign(asset)?))
            })
            .collect()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.rel == rel)
    }

    /// `child` and `item` links, in document order.
    pub fn child_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| link.is_child())
    }

    /// Whether the entry is the landing page of a STAC API with item search.
    pub fn is_searchable(&self) -> bool {
        self.conforms_to
            .iter()
            .any(|uri| uri.ends_with(ITEM_SEARCH_CONFORMANCE))
            || self.link("search").is_some()
    }

    pub fn search_url(&self) -> Result<Url> {
        match self.link("search") {
            Some(link) => resolve_href(&self.href, &link.href),
            None => resolve_href(&self.href, "search"),
        }
    }

    pub fn children(&self, reader: &CatalogReader) -> Result<Vec<CatalogEntry>> {
        reader.children(self)
    }

    pub fn child(&self, reader: &CatalogReader, id: &str) -> Result<Option<CatalogEntry>> {
        reader.child(self, id)
    }

    pub fn items(&self, reader: &CatalogReader) -> Result<Vec<CatalogEntry>> {
        reader.items(self)
    }
}

/// Reads catalog entries through a [Fetcher], handing out the optional
/// [Signer] to every entry it creates.
#[derive(Clone)]
pub struct CatalogReader {
    fetcher: Arc<dyn Fetcher>,
    signer: Option<Arc<dyn Signer>>,
}

impl Debug for CatalogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogReader")
            .field("fetcher", &self.fetcher)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl CatalogReader {
    pub fn new(fetcher: impl Fetcher + 'static) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            signer: None,
        }
    }

    pub fn with_signer(self, signer: impl Signer + 'static) -> Self {
        self.with_shared_signer(Arc::new(signer))
    }

    pub fn with_shared_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Root entry of `endpoint`.
    ///
    /// A cloud optimized GeoTIFF endpoint becomes a single item with one
    /// `data` asset.
    pub fn open(&self, endpoint: &CatalogEndpoint) -> Result<CatalogEntry> {
        info!("opening {endpoint}");
        match endpoint.tag() {
            DataTypeTag::StacApi
            | DataTypeTag::StacCatalog
            | DataTypeTag::StacCollection
            | DataTypeTag::StacItem => self.read_entry(endpoint.url()),
            DataTypeTag::CloudOptimizedGeoTiff => self.single_asset_item(endpoint.url()),
            tag @ (DataTypeTag::Zarr | DataTypeTag::NetCdf) => {
                Err(StacrioError::UnsupportedEndpoint {
                    url: endpoint.url().to_string(),
                    tag: Some(tag),
                })
            }
        }
    }

    fn single_asset_item(&self, url: &Url) -> Result<CatalogEntry> {
        let id = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|name| name.split('.').next())
            .filter(|stem| !stem.is_empty())
            .unwrap_or("data");
        let document = serde_json::json!({
            "type": "Feature",
            "id": id,
            "assets": {"data": {"href": url.as_str(), "type": "image/tiff"}},
        });
        self.entry_from_value(document, url)
    }

    /// Reads the entry stored at `url`.
    pub fn read_entry(&self, url: &Url) -> Result<CatalogEntry> {
        let document = self.fetcher.get_json(url)?;
        self.entry_from_value(document, url)
    }

    /// Entry from an already fetched document, relative hrefs are resolved
    /// against `location`.
    pub fn entry_from_value(&self, document: Value, location: &Url) -> Result<CatalogEntry> {
        let document: StacDocument =
            serde_json::from_value(document).map_err(|error| StacrioError::CatalogAccess {
                url: location.to_string(),
                reason: format!("not a STAC document: {error}"),
            })?;
        CatalogEntry::from_document(document, location, self.signer.clone())
    }

    /// Reads every `child`/`item` link of `entry`, in link order.
    pub fn children(&self, entry: &CatalogEntry) -> Result<Vec<CatalogEntry>> {
        entry
            .child_links()
            .map(|link| self.read_link(link))
            .collect()
    }

    /// First child of `entry` with the given id, reading children in order
    /// until found.
    pub fn child(&self, entry: &CatalogEntry, id: &str) -> Result<Option<CatalogEntry>> {
        for link in entry.child_links() {
            let child = self.read_link(link)?;
            if child.id() == id {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Reads the `item` links of `entry`.
    pub fn items(&self, entry: &CatalogEntry) -> Result<Vec<CatalogEntry>> {
        entry
            .links()
            .iter()
            .filter(|link| link.rel == "item")
            .map(|link| self.read_link(link))
            .collect()
    }

    pub(crate) fn read_link(&self, link: &Link) -> Result<CatalogEntry> {
        let url = Url::parse(&link.href).map_err(|error| StacrioError::InvalidUrl {
            url: link.href.clone(),
            reason: error.to_string(),
        })?;
        self.read_entry(&url)
    }
}
