use std::{env, fs, path::Path, str::FromStr};

use log::{debug, LevelFilter};
use serde::{Deserialize, Serialize};

use crate::{
    components::{
        catalog::CatalogReader,
        endpoint::parse_url,
        fetch::{DefaultFetcher, Fetcher},
        render::RenderOptions,
        search::{Search, SearchPredicate},
        signing::TokenSigner,
    },
    errors::{Result, StacrioError},
};

/// How asset hrefs get signed, `token` wins over `token_endpoint`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub token: Option<String>,
    pub token_endpoint: Option<String>,
}

impl SigningConfig {
    pub fn signer(&self, fetcher: &dyn Fetcher) -> Result<Option<TokenSigner>> {
        match (&self.token, &self.token_endpoint) {
            (Some(token), _) => Ok(Some(TokenSigner::new(token))),
            (None, Some(endpoint)) => TokenSigner::fetch(fetcher, &parse_url(endpoint)?).map(Some),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub collections: Vec<String>,
    /// Page size requested from search APIs.
    pub limit: usize,
    pub max_items: Option<usize>,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            limit: Search::DEFAULT_PAGE_SIZE,
            max_items: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint used when none is given on the command line.
    pub endpoint: Option<String>,
    pub user_agent: String,
    pub signing: SigningConfig,
    pub search: SearchDefaults,
    pub render: RenderOptions,
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            user_agent: concat!("stacrio/", env!("CARGO_PKG_VERSION")).into(),
            signing: SigningConfig::default(),
            search: SearchDefaults::default(),
            render: RenderOptions::default(),
            log_level: None,
        }
    }
}

/// Replaces every `${VAR}` with the value of the environment variable.
fn substitute_env(text: &str) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let Some(length) = rest[start + 2..].find('}') else {
            return Err(StacrioError::Config(format!(
                "unterminated variable in `{}`",
                &rest[start..]
            )));
        };
        let name = &rest[start + 2..start + 2 + length];
        let value = env::var(name)
            .map_err(|_| StacrioError::Config(format!("environment variable {name} is not set")))?;
        output.push_str(&value);
        rest = &rest[start + 3 + length..];
    }
    output.push_str(rest);
    Ok(output)
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading config from {}", path.display());
        fs::read_to_string(path)?.parse()
    }

    pub fn log_level(&self) -> Result<Option<LevelFilter>> {
        self.log_level
            .as_deref()
            .map(|level| {
                LevelFilter::from_str(level)
                    .map_err(|_| StacrioError::Config(format!("unknown log level {level}")))
            })
            .transpose()
    }

    /// Reader fetching over http or from disk, signing when configured.
    pub fn reader(&self) -> Result<CatalogReader> {
        let fetcher = DefaultFetcher::new(&self.user_agent)?;
        let signer = self.signing.signer(&fetcher)?;
        let reader = CatalogReader::new(fetcher);
        Ok(match signer {
            Some(signer) => reader.with_signer(signer),
            None => reader,
        })
    }

    /// Predicate carrying the configured collections and item limit.
    pub fn predicate(&self) -> SearchPredicate {
        let predicate = SearchPredicate::new().with_collections(self.search.collections.clone());
        match self.search.max_items {
            Some(max_items) => predicate.with_max_items(max_items),
            None => predicate,
        }
    }
}

impl FromStr for Config {
    type Err = StacrioError;

    fn from_str(yaml: &str) -> Result<Self> {
        let yaml = substitute_env(yaml)?;
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(&yaml)?;
        if config.search.limit == 0 {
            return Err(StacrioError::Config("search.limit must be positive".into()));
        }
        Ok(config)
    }
}
