use std::collections::{HashSet, VecDeque};

use either::Either;
use log::{debug, info};
use serde_json::Value;
use url::Url;

use crate::{
    components::{
        catalog::{CatalogEntry, CatalogReader, EntryKind},
        stac::Link,
    },
    errors::{Result, StacrioError},
};

pub mod interval;
pub mod predicate;

pub use interval::Interval;
pub use predicate::{AttributeFilter, Comparison, SearchPredicate};

/// Items of a search, lazily fetched page by page or entry by entry.
pub type SearchResults<'a> = std::iter::Take<Either<ApiPages<'a>, CatalogWalk<'a>>>;

/// Item search over a catalog root.
///
/// STAC API roots are searched remotely, static catalogs are walked and
/// filtered locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    predicate: SearchPredicate,
    page_size: usize,
}

impl Search {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    pub fn new(predicate: SearchPredicate) -> Self {
        Self {
            predicate,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Items requested per API page, the `limit` of the request.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn predicate(&self) -> &SearchPredicate {
        &self.predicate
    }

    /// Matching items in service order (API) or depth-first link order
    /// (static catalogs), at most `max_items` of them.
    pub fn iter<'a>(
        &'a self,
        reader: &'a CatalogReader,
        root: &CatalogEntry,
    ) -> Result<SearchResults<'a>> {
        let max_items = self.predicate.max_items().unwrap_or(usize::MAX);
        let results = if root.is_searchable() {
            let limit = self.page_size.min(max_items).max(1);
            let url = root.search_url()?;
            info!("searching {url}");
            Either::Left(ApiPages::new(
                reader,
                url,
                self.predicate.to_search_body(limit),
            ))
        } else {
            info!("walking static catalog {}", root.href());
            Either::Right(CatalogWalk::new(reader, &self.predicate, root.clone()))
        };
        Ok(results.take(max_items))
    }

    /// Collects every matching item, an empty result is not an error.
    pub fn run(&self, reader: &CatalogReader, root: &CatalogEntry) -> Result<Vec<CatalogEntry>> {
        let items = self.iter(reader, root)?.collect::<Result<Vec<_>>>()?;
        info!("search matched {} items", items.len());
        Ok(items)
    }
}

/// Orders entries by acquisition timestamp, undated entries last.
pub fn sort_by_datetime(entries: &mut [CatalogEntry]) {
    entries.sort_by_key(|entry| {
        let datetime = entry.datetime();
        (datetime.is_none(), datetime)
    });
}

#[derive(Debug, Clone)]
enum PageRequest {
    Get(Url),
    Post(Url, Value),
}

impl PageRequest {
    fn url(&self) -> &Url {
        match self {
            PageRequest::Get(url) | PageRequest::Post(url, _) => url,
        }
    }
}

/// Pages of a STAC API item search, following `next` links.
pub struct ApiPages<'a> {
    reader: &'a CatalogReader,
    next: Option<PageRequest>,
    page_url: Url,
    features: VecDeque<Value>,
    pages: usize,
}

impl<'a> ApiPages<'a> {
    fn new(reader: &'a CatalogReader, url: Url, body: Value) -> Self {
        Self {
            reader,
            next: Some(PageRequest::Post(url.clone(), body)),
            page_url: url,
            features: VecDeque::new(),
            pages: 0,
        }
    }

    fn next_request(previous: &PageRequest, page: &Value) -> Result<Option<PageRequest>> {
        let link = page["links"]
            .as_array()
            .and_then(|links| links.iter().find(|link| link["rel"] == "next"));
        let Some(link) = link else {
            return Ok(None);
        };
        let link: Link = serde_json::from_value(link.clone())?;
        let url = previous
            .url()
            .join(&link.href)
            .map_err(|error| StacrioError::InvalidUrl {
                url: link.href.clone(),
                reason: error.to_string(),
            })?;
        if !link.is_post() {
            return Ok(Some(PageRequest::Get(url)));
        }
        let previous_body = match previous {
            PageRequest::Post(_, body) => body.clone(),
            PageRequest::Get(_) => Value::Object(Default::default()),
        };
        let body = match (link.body, link.merge) {
            (Some(Value::Object(next)), true) => {
                let mut merged = previous_body;
                if let Value::Object(merged) = &mut merged {
                    merged.extend(next);
                }
                merged
            }
            (Some(body), _) => body,
            (None, _) => previous_body,
        };
        Ok(Some(PageRequest::Post(url, body)))
    }

    fn fetch(&mut self, request: PageRequest) -> Result<()> {
        let fetcher = self.reader.fetcher();
        let mut page = match &request {
            PageRequest::Get(url) => fetcher.get_json(url)?,
            PageRequest::Post(url, body) => fetcher.post_json(url, body)?,
        };
        let features = match page.get_mut("features").map(Value::take) {
            Some(Value::Array(features)) => features,
            _ => {
                return Err(StacrioError::CatalogAccess {
                    url: request.url().to_string(),
                    reason: "search response has no features".into(),
                })
            }
        };
        self.pages += 1;
        debug!(
            "page {} of {} returned {} items",
            self.pages,
            request.url(),
            features.len()
        );
        self.next = if features.is_empty() {
            None
        } else {
            Self::next_request(&request, &page)?
        };
        self.page_url = request.url().clone();
        self.features = features.into();
        Ok(())
    }
}

impl Iterator for ApiPages<'_> {
    type Item = Result<CatalogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(feature) = self.features.pop_front() {
                return Some(self.reader.entry_from_value(feature, &self.page_url));
            }
            let request = self.next.take()?;
            if let Err(error) = self.fetch(request) {
                return Some(Err(error));
            }
        }
    }
}

enum Pending {
    Entry(CatalogEntry, Option<String>),
    Link(Link, Option<String>),
}

/// Depth-first walk of a static catalog in link order, yielding the items
/// that match the predicate.
///
/// Every href is read at most once, revisits are skipped.
pub struct CatalogWalk<'a> {
    reader: &'a CatalogReader,
    predicate: &'a SearchPredicate,
    stack: Vec<Pending>,
    visited: HashSet<String>,
}

impl<'a> CatalogWalk<'a> {
    fn new(reader: &'a CatalogReader, predicate: &'a SearchPredicate, root: CatalogEntry) -> Self {
        let collection = (root.kind() == EntryKind::Collection).then(|| root.id().to_string());
        Self {
            reader,
            predicate,
            stack: vec![Pending::Entry(root, collection)],
            visited: HashSet::new(),
        }
    }

    fn visit(&mut self, pending: Pending) -> Result<Option<(CatalogEntry, Option<String>)>> {
        match pending {
            Pending::Entry(entry, collection) => {
                self.visited.insert(entry.href().to_string());
                Ok(Some((entry, collection)))
            }
            Pending::Link(link, collection) => {
                if !self.visited.insert(link.href.clone()) {
                    debug!("skipping revisit of {}", link.href);
                    return Ok(None);
                }
                let entry = self.reader.read_link(&link)?;
                if entry.href().as_str() != link.href
                    && !self.visited.insert(entry.href().to_string())
                {
                    debug!("skipping revisit of {}", entry.href());
                    return Ok(None);
                }
                Ok(Some((entry, collection)))
            }
        }
    }
}

impl Iterator for CatalogWalk<'_> {
    type Item = Result<CatalogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(pending) = self.stack.pop() {
            let (entry, collection) = match self.visit(pending) {
                Ok(Some(visited)) => visited,
                Ok(None) => continue,
                Err(error) => return Some(Err(error)),
            };
            if entry.is_item() {
                if self.predicate.matches_within(&entry, collection.as_deref()) {
                    return Some(Ok(entry));
                }
                continue;
            }
            let collection = match entry.kind() {
                EntryKind::Collection => Some(entry.id().to_string()),
                _ => collection,
            };
            let children = entry.child_links().cloned().collect::<Vec<_>>();
            self.stack.extend(
                children
                    .into_iter()
                    .rev()
                    .map(|link| Pending::Link(link, collection.clone())),
            );
        }
        None
    }
}
