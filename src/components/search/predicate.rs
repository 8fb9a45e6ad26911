use std::{cmp::Ordering, fmt::Display, str::FromStr};

use itertools::Itertools;
use serde_json::{json, Map, Value};

use crate::{
    components::{
        bounds::Bbox,
        catalog::{CatalogEntry, EntryKind},
        search::interval::Interval,
        stac::Properties,
    },
    errors::{Result, StacrioError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl Comparison {
    /// Operator of the STAC query extension.
    pub fn query_operator(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "neq",
            Self::Lt => "lt",
            Self::Le => "lte",
            Self::Gt => "gt",
            Self::Ge => "gte",
            Self::In => "in",
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => " in ",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" | "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }
}

fn parse_value(text: &str) -> Value {
    let text = text.trim();
    if let Ok(integer) = text.parse::<i64>() {
        return integer.into();
    }
    if let Ok(float) = text.parse::<f64>() {
        if float.is_finite() {
            return float.into();
        }
    }
    match text {
        "true" => return true.into(),
        "false" => return false.into(),
        _ => (),
    }
    let unquoted = text
        .strip_prefix('"')
        .and_then(|text| text.strip_suffix('"'))
        .unwrap_or(text);
    unquoted.into()
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(lhs), Value::Number(rhs)) => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
        (Value::String(lhs), Value::String(rhs)) => Some(lhs.cmp(rhs)),
        (Value::Bool(lhs), Value::Bool(rhs)) => Some(lhs.cmp(rhs)),
        _ => None,
    }
}

fn same_value(lhs: &Value, rhs: &Value) -> bool {
    compare(lhs, rhs).map_or(lhs == rhs, Ordering::is_eq)
}

/// Comparison of one entry property against a value.
///
/// Entries without the property never match, whatever the comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeFilter {
    key: String,
    comparison: Comparison,
    value: Value,
}

impl AttributeFilter {
    pub fn new(key: impl Into<String>, comparison: Comparison, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            comparison,
            value: value.into(),
        }
    }

    pub fn one_of<V: Into<Value>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect_vec();
        Self::new(key, Comparison::In, Value::Array(values))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn matches(&self, properties: &Properties) -> bool {
        let Some(property) = properties.get(&self.key).filter(|value| !value.is_null()) else {
            return false;
        };
        let ordering = || compare(property, &self.value);
        match self.comparison {
            Comparison::Eq => same_value(property, &self.value),
            Comparison::Ne => !same_value(property, &self.value),
            Comparison::Lt => ordering().is_some_and(Ordering::is_lt),
            Comparison::Le => ordering().is_some_and(Ordering::is_le),
            Comparison::Gt => ordering().is_some_and(Ordering::is_gt),
            Comparison::Ge => ordering().is_some_and(Ordering::is_ge),
            Comparison::In => match &self.value {
                Value::Array(values) => values.iter().any(|value| same_value(property, value)),
                value => same_value(property, value),
            },
        }
    }

    /// `{operator: value}` term of a STAC query extension object.
    pub fn to_query(&self) -> Map<String, Value> {
        let mut term = Map::new();
        let value = match (self.comparison, &self.value) {
            (Comparison::In, value) if !value.is_array() => Value::Array(vec![value.clone()]),
            (_, value) => value.clone(),
        };
        term.insert(self.comparison.query_operator().into(), value);
        term
    }
}

impl Display for AttributeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match &self.value {
            Value::Array(values) => values.iter().join(","),
            Value::String(text) => text.clone(),
            value => value.to_string(),
        };
        write!(f, "{}{}{}", self.key, self.comparison.symbol(), value)
    }
}

impl FromStr for AttributeFilter {
    type Err = StacrioError;

    /// `<key><op><value>` with `op` one of `= != < <= > >=`, or
    /// `<key> in <v1>,<v2>,..`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StacrioError::InvalidFilter(s.into());
        let operator = s.find(['<', '>', '=', '!']);
        let membership = s
            .find(" in ")
            .filter(|position| operator.map_or(true, |operator| *position < operator));
        if let Some(position) = membership {
            let (key, values) = (&s[..position], &s[position + 4..]);
            let key = key.trim();
            let values = values
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(parse_value)
                .collect_vec();
            if key.is_empty() || values.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::one_of(key, values));
        }
        let start = operator.ok_or_else(invalid)?;
        let length = if s[start + 1..].starts_with('=') { 2 } else { 1 };
        let comparison = Comparison::from_symbol(&s[start..start + length]).ok_or_else(invalid)?;
        let key = s[..start].trim();
        let value = s[start + length..].trim();
        if key.is_empty() || value.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(key, comparison, parse_value(value)))
    }
}

/// Conjunction of optional spatial, temporal, collection and attribute
/// constraints, with an optional cap on the number of items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPredicate {
    bbox: Option<Bbox>,
    datetime: Option<Interval>,
    collections: Vec<String>,
    filters: Vec<AttributeFilter>,
    max_items: Option<usize>,
}

impl SearchPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bbox(mut self, bbox: Bbox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_datetime(mut self, datetime: Interval) -> Self {
        self.datetime = Some(datetime);
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collections.push(collection.into());
        self
    }

    pub fn with_collections<S: Into<String>>(
        mut self,
        collections: impl IntoIterator<Item = S>,
    ) -> Self {
        self.collections.extend(collections.into_iter().map(Into::into));
        self
    }

    pub fn with_filter(mut self, filter: AttributeFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn bbox(&self) -> Option<&Bbox> {
        self.bbox.as_ref()
    }

    pub fn datetime(&self) -> Option<&Interval> {
        self.datetime.as_ref()
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn filters(&self) -> &[AttributeFilter] {
        &self.filters
    }

    pub fn max_items(&self) -> Option<usize> {
        self.max_items
    }

    /// Whether an item satisfies every constraint.
    ///
    /// Catalogs and collections never match.
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        self.matches_within(entry, None)
    }

    /// Like [Self::matches], `parent_collection` stands in for items that do
    /// not name their collection.
    pub fn matches_within(&self, entry: &CatalogEntry, parent_collection: Option<&str>) -> bool {
        if entry.kind() != EntryKind::Item {
            return false;
        }
        if let Some(bbox) = &self.bbox {
            if !entry.footprint().is_some_and(|footprint| footprint.intersects(bbox)) {
                return false;
            }
        }
        if let Some(interval) = &self.datetime {
            let overlaps = entry
                .time_range()
                .is_some_and(|(start, end)| interval.overlaps(&start, &end));
            if !overlaps {
                return false;
            }
        }
        if !self.collections.is_empty() {
            let collection = entry.collection().or(parent_collection);
            let listed = |collection: &str| self.collections.iter().any(|id| id == collection);
            if !collection.is_some_and(listed) {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|filter| filter.matches(entry.properties()))
    }

    /// Body of a STAC API `POST /search` request.
    pub fn to_search_body(&self, limit: usize) -> Value {
        let mut body = Map::new();
        if let Some(bbox) = &self.bbox {
            body.insert("bbox".into(), json!(bbox.to_array()));
        }
        if let Some(datetime) = &self.datetime {
            body.insert("datetime".into(), datetime.to_stac().into());
        }
        if !self.collections.is_empty() {
            body.insert("collections".into(), json!(self.collections));
        }
        if !self.filters.is_empty() {
            let mut query = Map::new();
            for filter in &self.filters {
                let terms = query
                    .entry(filter.key().to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(terms) = terms {
                    terms.extend(filter.to_query());
                }
            }
            body.insert("query".into(), Value::Object(query));
        }
        body.insert("limit".into(), limit.into());
        Value::Object(body)
    }
}
