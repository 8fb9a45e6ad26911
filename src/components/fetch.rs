use std::fmt::Debug;

use log::debug;
use reqwest::header::ACCEPT;
use serde_json::Value;
use url::Url;

use crate::errors::{Result, StacrioError};

const JSON_MEDIA_TYPES: &str = "application/geo+json, application/json";

fn access_error(url: &Url, reason: impl ToString) -> StacrioError {
    StacrioError::CatalogAccess {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Retrieves JSON documents of a catalog.
///
/// Failures are reported as [StacrioError::CatalogAccess] and never retried.
pub trait Fetcher: Debug {
    fn get_json(&self, url: &Url) -> Result<Value>;
    fn post_json(&self, url: &Url, body: &Value) -> Result<Value>;
}

/// Blocking http(s) fetcher.
///
/// The client has no request timeout, callers needing bounded latency wrap
/// calls themselves.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(|error| StacrioError::Config(format!("http client: {error}")))?;
        Ok(Self { client })
    }

    fn read_response(url: &Url, response: reqwest::blocking::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(access_error(url, format!("http status {status}")));
        }
        response
            .json::<Value>()
            .map_err(|error| access_error(url, error))
    }
}

impl Fetcher for HttpFetcher {
    fn get_json(&self, url: &Url) -> Result<Value> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, JSON_MEDIA_TYPES)
            .send()
            .map_err(|error| access_error(url, error))?;
        Self::read_response(url, response)
    }

    fn post_json(&self, url: &Url, body: &Value) -> Result<Value> {
        debug!("POST {url} {body}");
        let response = self
            .client
            .post(url.clone())
            .header(ACCEPT, JSON_MEDIA_TYPES)
            .json(body)
            .send()
            .map_err(|error| access_error(url, error))?;
        Self::read_response(url, response)
    }
}

/// Reads `file://` documents, e.g. static catalogs on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl Fetcher for FileFetcher {
    fn get_json(&self, url: &Url) -> Result<Value> {
        let path = url
            .to_file_path()
            .map_err(|_| access_error(url, "not a local file url"))?;
        debug!("reading {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|error| access_error(url, error))?;
        serde_json::from_str(&content).map_err(|error| access_error(url, error))
    }

    fn post_json(&self, url: &Url, _body: &Value) -> Result<Value> {
        Err(access_error(url, "static catalogs can not be searched remotely"))
    }
}

/// Dispatches on the url scheme: `file` to [FileFetcher], anything else to
/// [HttpFetcher].
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl DefaultFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(user_agent)?,
            file: FileFetcher,
        })
    }

    fn pick(&self, url: &Url) -> &dyn Fetcher {
        match url.scheme() {
            "file" => &self.file,
            _ => &self.http,
        }
    }
}

impl Fetcher for DefaultFetcher {
    fn get_json(&self, url: &Url) -> Result<Value> {
        self.pick(url).get_json(url)
    }

    fn post_json(&self, url: &Url, body: &Value) -> Result<Value> {
        self.pick(url).post_json(url, body)
    }
}
