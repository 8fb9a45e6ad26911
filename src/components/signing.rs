use itertools::Itertools;
use log::debug;
use url::Url;

use crate::{
    components::{fetch::Fetcher, stac::Asset},
    errors::{Result, StacrioError},
};

/// Turns an asset into one whose href can be fetched.
///
/// Applied lazily when an asset is accessed, never to a whole tree.
/// Implementations must be idempotent: signing a signed asset returns it
/// unchanged.
pub trait Signer: Send + Sync {
    fn sign(&self, asset: &Asset) -> Result<Asset>;
}

impl<F> Signer for F
where
    F: Fn(&Asset) -> Result<Asset> + Send + Sync,
{
    fn sign(&self, asset: &Asset) -> Result<Asset> {
        self(asset)
    }
}

/// Appends a query string token (SAS style, `st=..&se=..&sig=..`) to http
/// asset hrefs.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSigner {
    pairs: Vec<(String, String)>,
}

impl TokenSigner {
    pub fn new(token: &str) -> Self {
        let pairs = url::form_urlencoded::parse(token.trim_start_matches('?').as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Self { pairs }
    }

    /// Requests a token from `endpoint`, which answers `{"token": "..."}`.
    pub fn fetch(fetcher: &dyn Fetcher, endpoint: &Url) -> Result<Self> {
        let response = fetcher.get_json(endpoint)?;
        let token = response["token"]
            .as_str()
            .ok_or_else(|| StacrioError::CatalogAccess {
                url: endpoint.to_string(),
                reason: "response has no token".into(),
            })?;
        debug!("received token from {endpoint}");
        Ok(Self::new(token))
    }

    fn is_signed(&self, url: &Url) -> bool {
        let existing = url.query_pairs().collect_vec();
        self.pairs.iter().all(|(key, value)| {
            existing
                .iter()
                .any(|(existing_key, existing_value)| {
                    existing_key == key && existing_value == value
                })
        })
    }
}

impl Signer for TokenSigner {
    fn sign(&self, asset: &Asset) -> Result<Asset> {
        let mut url = match Url::parse(&asset.href) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => return Ok(asset.clone()),
        };
        if self.is_signed(&url) {
            return Ok(asset.clone());
        }
        url.query_pairs_mut().extend_pairs(&self.pairs);
        Ok(Asset {
            href: url.into(),
            ..asset.clone()
        })
    }
}
