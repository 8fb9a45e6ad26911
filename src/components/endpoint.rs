use std::{fmt::Display, path::Path, str::FromStr};

use log::debug;
use serde_json::Value;
use url::Url;

use crate::{
    components::fetch::Fetcher,
    errors::{Result, StacrioError},
};

/// Closed set of data types an endpoint can be read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataTypeTag {
    StacApi,
    StacCatalog,
    StacCollection,
    StacItem,
    CloudOptimizedGeoTiff,
    Zarr,
    NetCdf,
}

impl DataTypeTag {
    pub const ALL: [DataTypeTag; 7] = [
        Self::StacApi,
        Self::StacCatalog,
        Self::StacCollection,
        Self::StacItem,
        Self::CloudOptimizedGeoTiff,
        Self::Zarr,
        Self::NetCdf,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::StacApi => "stac-api",
            Self::StacCatalog => "stac-catalog",
            Self::StacCollection => "stac-collection",
            Self::StacItem => "stac-item",
            Self::CloudOptimizedGeoTiff => "cloud-optimized-geo-tiff",
            Self::Zarr => "zarr",
            Self::NetCdf => "net-cdf",
        }
    }

    pub fn is_stac(&self) -> bool {
        matches!(
            self,
            Self::StacApi | Self::StacCatalog | Self::StacCollection | Self::StacItem
        )
    }
}

impl Display for DataTypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataTypeTag {
    type Err = StacrioError;
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| StacrioError::Config(format!("unknown data type {s:?}")))
    }
}

/// Parses `url`, absolute filesystem paths become `file://` urls.
pub fn parse_url(url: &str) -> Result<Url> {
    let invalid = |reason: String| StacrioError::InvalidUrl {
        url: url.into(),
        reason,
    };
    if Path::new(url).is_absolute() {
        return Url::from_file_path(url).map_err(|_| invalid("not a valid file path".into()));
    }
    Url::parse(url).map_err(|error| invalid(error.to_string()))
}

/// Recommends [DataTypeTag]s for a url, most likely first.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointResolver;

impl EndpointResolver {
    /// Ranks interpretations from the url alone.
    ///
    /// An empty list means nothing was recognized.
    pub fn recommend(url: &str) -> Result<Vec<DataTypeTag>> {
        Ok(Self::recommend_url(&parse_url(url)?))
    }

    fn recommend_url(url: &Url) -> Vec<DataTypeTag> {
        use DataTypeTag::*;

        let segments: Vec<String> = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_ascii_lowercase)
                    .collect()
            })
            .unwrap_or_default();
        let file_name = segments.last().map(String::as_str).unwrap_or_default();
        let extension = file_name.rsplit_once('.').map(|(_, extension)| extension);

        let tags = match (file_name, extension) {
            (_, Some("tif" | "tiff")) => vec![CloudOptimizedGeoTiff],
            (_, Some("nc" | "nc4")) => vec![NetCdf],
            _ if segments.iter().any(|segment| segment.ends_with(".zarr")) => vec![Zarr],
            ("catalog.json", _) => vec![StacCatalog, StacCollection],
            ("collection.json", _) => vec![StacCollection, StacCatalog],
            (_, Some("json" | "geojson")) => vec![StacItem, StacCollection, StacCatalog],
            _ if segments.iter().any(|segment| segment.contains("stac")) => {
                vec![StacApi, StacCatalog]
            }
            _ => vec![],
        };
        debug!("recommending {tags:?} for {url}");
        tags
    }

    /// Refines [Self::recommend] by reading the document behind `url`.
    ///
    /// Targets recognized as array formats are not fetched.
    pub fn probe(fetcher: &dyn Fetcher, url: &str) -> Result<Vec<DataTypeTag>> {
        let parsed = parse_url(url)?;
        let recommended = Self::recommend_url(&parsed);
        if recommended.first().is_some_and(|tag| !tag.is_stac()) {
            return Ok(recommended);
        }
        let document = fetcher.get_json(&parsed)?;
        Ok(Self::from_document(&document).unwrap_or(recommended))
    }

    fn from_document(document: &Value) -> Option<Vec<DataTypeTag>> {
        use DataTypeTag::*;

        let searchable = document["conformsTo"]
            .as_array()
            .is_some_and(|uris| {
                uris.iter()
                    .filter_map(Value::as_str)
                    .any(|uri| uri.ends_with("item-search"))
            })
            || document["links"].as_array().is_some_and(|links| {
                links.iter().any(|link| link["rel"] == "search")
            });
        match (document["type"].as_str()?, searchable) {
            ("Feature", _) => Some(vec![StacItem]),
            ("Catalog", true) => Some(vec![StacApi, StacCatalog]),
            ("Catalog", false) => Some(vec![StacCatalog]),
            ("Collection", true) => Some(vec![StacApi, StacCollection]),
            ("Collection", false) => Some(vec![StacCollection]),
            _ => None,
        }
    }
}

/// Url with the data type it is read as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEndpoint {
    url: Url,
    tag: DataTypeTag,
}

impl CatalogEndpoint {
    pub fn new(url: Url, tag: DataTypeTag) -> Self {
        Self { url, tag }
    }

    /// Endpoint with the top recommendation of [EndpointResolver::recommend].
    pub fn resolve(url: &str) -> Result<Self> {
        let parsed = parse_url(url)?;
        match EndpointResolver::recommend_url(&parsed).first() {
            Some(tag) => Ok(Self::new(parsed, *tag)),
            None => Err(StacrioError::UnsupportedEndpoint {
                url: url.into(),
                tag: None,
            }),
        }
    }

    /// Like [Self::resolve], reading the document behind `url` when the url
    /// alone is not recognized.
    pub fn discover(fetcher: &dyn Fetcher, url: &str) -> Result<Self> {
        let parsed = parse_url(url)?;
        let mut tags = EndpointResolver::recommend_url(&parsed);
        if tags.is_empty() {
            debug!("nothing recognized in {url}, reading its document");
            tags = EndpointResolver::probe(fetcher, url)?;
        }
        match tags.first() {
            Some(tag) => Ok(Self::new(parsed, *tag)),
            None => Err(StacrioError::UnsupportedEndpoint {
                url: url.into(),
                tag: None,
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn tag(&self) -> DataTypeTag {
        self.tag
    }
}

impl Display for CatalogEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.url, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::fetch::FileFetcher;
    use rstest::rstest;
    use std::io::Write;
    use DataTypeTag::*;

    #[rstest]
    #[case("https://planetarycomputer.microsoft.com/api/stac/v1", vec![StacApi, StacCatalog])]
    #[case("https://landsatlook.usgs.gov/stac-server/", vec![StacApi, StacCatalog])]
    #[case("https://example.com/landsat/catalog.json", vec![StacCatalog, StacCollection])]
    #[case("https://example.com/landsat/collection.json", vec![StacCollection, StacCatalog])]
    #[case("https://example.com/items/LC09.json", vec![StacItem, StacCollection, StacCatalog])]
    #[case("https://example.com/scenes/LC09_SR_B4.TIF", vec![CloudOptimizedGeoTiff])]
    #[case("s3://bucket/cube.zarr/red/", vec![Zarr])]
    #[case("https://example.com/era5.nc", vec![NetCdf])]
    #[case("https://example.com/data/", vec![])]
    fn recommends_from_url(#[case] url: &str, #[case] expected: Vec<DataTypeTag>) {
        assert_eq!(EndpointResolver::recommend(url).unwrap(), expected);
    }

    #[test]
    fn invalid_url_is_an_error() {
        assert!(matches!(
            EndpointResolver::recommend("not a url"),
            Err(StacrioError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn unrecognized_endpoint_can_not_be_resolved() {
        assert!(matches!(
            CatalogEndpoint::resolve("https://example.com/data/"),
            Err(StacrioError::UnsupportedEndpoint { tag: None, .. })
        ));
        let endpoint = CatalogEndpoint::resolve("https://example.com/catalog.json").unwrap();
        assert_eq!(endpoint.tag(), StacCatalog);
    }

    #[test]
    fn probe_reads_document_type() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"type": "Catalog", "id": "api", "conformsTo": ["https://api.stacspec.org/v1.0.0/item-search"]}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(
            EndpointResolver::probe(&FileFetcher, path).unwrap(),
            vec![StacApi, StacCatalog]
        );
    }

    #[test]
    fn probe_skips_array_formats() {
        assert_eq!(
            EndpointResolver::probe(&FileFetcher, "/nowhere/B4.tif").unwrap(),
            vec![CloudOptimizedGeoTiff]
        );
    }

    #[test]
    fn unrecognized_url_is_discovered_from_its_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1");
        std::fs::write(
            &path,
            r#"{"type": "Catalog", "id": "api", "links": [{"rel": "search", "href": "./search"}]}"#,
        )
        .unwrap();
        let path = path.to_str().unwrap();
        assert!(EndpointResolver::recommend(path).unwrap().is_empty());
        let endpoint = CatalogEndpoint::discover(&FileFetcher, path).unwrap();
        assert_eq!(endpoint.tag(), StacApi);
    }

    #[test]
    fn undiscoverable_endpoint_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme");
        std::fs::write(&path, r#"{"title": "not stac"}"#).unwrap();
        assert!(matches!(
            CatalogEndpoint::discover(&FileFetcher, path.to_str().unwrap()),
            Err(StacrioError::UnsupportedEndpoint { tag: None, .. })
        ));
    }

    #[test]
    fn tags_parse_from_names() {
        for tag in DataTypeTag::ALL {
            assert_eq!(tag.name().parse::<DataTypeTag>().unwrap(), tag);
        }
    }
}
