//! List-query helper
//!
//! Clients may send any query string they like. [`ListQuery::parse`] turns it
//! into a safe, typed description of a list request:
//!
//! - keys that do not name a declared field are dropped (they would otherwise
//!   turn a valid request into an empty result)
//! - `field[gte]=v` style keys become comparisons
//! - `sort`, `fields`, `page` and `limit` drive ordering, projection and paging
//!
//! Nothing here touches SQL; the server crate renders a `ListQuery` into a
//! parameterized statement using only the column names declared below.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::{Pagination, ValidationError};

/// How the raw query-string value of a field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    Timestamp,
    Uuid,
}

/// A field clients may filter and sort on.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Wire name (camelCase, as serialized)
    pub name: &'static str,
    /// Backing column
    pub column: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }
}

/// Queryable surface of a resource.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub fields: &'static [Field],
    pub default_sort: &'static str,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "ne" => Some(Self::Ne),
            "eq" => Some(Self::Eq),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// A typed filter value, ready to be bound.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl FilterValue {
    fn parse(field: &'static Field, raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let bad = || {
            ValidationError::custom(format!("Invalid value '{}' for field {}", raw, field.name))
        };
        Ok(match field.kind {
            FieldKind::Text => Self::Text(raw.to_owned()),
            FieldKind::Integer => Self::Integer(raw.parse().map_err(|_| bad())?),
            FieldKind::Float => {
                let v: f64 = raw.parse().map_err(|_| bad())?;
                if !v.is_finite() {
                    return Err(bad());
                }
                Self::Float(v)
            }
            FieldKind::Bool => Self::Bool(raw.parse().map_err(|_| bad())?),
            FieldKind::Uuid => Self::Uuid(raw.parse().map_err(|_| bad())?),
            FieldKind::Timestamp => Self::Timestamp(parse_timestamp(raw).ok_or_else(bad)?),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub op: Op,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: &'static str,
    pub direction: Direction,
}

/// Field selection applied to serialized items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let names: Vec<&str> = split_list(raw).collect();
        if names.is_empty() {
            return Ok(Self::All);
        }

        let excluded = names.iter().filter(|n| n.starts_with('-')).count();
        if excluded == names.len() {
            Ok(Self::Exclude(
                names.iter().map(|n| n.trim_start_matches('-').to_owned()).collect(),
            ))
        } else if excluded == 0 {
            Ok(Self::Include(names.iter().map(|n| (*n).to_owned()).collect()))
        } else {
            Err(ValidationError::custom(
                "Projection cannot mix inclusion and exclusion",
            ))
        }
    }

    /// Apply to a single object or to every object of an array.
    pub fn apply(&self, value: Json) -> Json {
        match value {
            Json::Array(items) => Json::Array(items.into_iter().map(|v| self.apply(v)).collect()),
            Json::Object(map) => Json::Object(self.apply_object(map)),
            other => other,
        }
    }

    fn apply_object(&self, map: Map<String, Json>) -> Map<String, Json> {
        match self {
            Self::All => map,
            Self::Include(names) => map
                .into_iter()
                .filter(|(k, _)| k == "id" || names.iter().any(|n| n == k))
                .collect(),
            Self::Exclude(names) => map
                .into_iter()
                .filter(|(k, _)| !names.iter().any(|n| n == k))
                .collect(),
        }
    }
}

/// A parsed list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub pagination: Option<Pagination>,
}

impl ListQuery {
    /// Empty query: no filter, default order, every field, no paging.
    pub fn all(schema: &Schema) -> Self {
        Self {
            filters: Vec::new(),
            sort: parse_sort(schema, schema.default_sort),
            projection: Projection::All,
            pagination: None,
        }
    }

    /// Build a safe list query from raw query-string parameters.
    pub fn parse(params: &HashMap<String, String>, schema: &Schema) -> Result<Self, ValidationError> {
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();

        let mut filters = Vec::new();
        for key in keys {
            if matches!(key.as_str(), "sort" | "fields" | "page" | "limit") {
                continue;
            }
            let (name, op) = match key.split_once('[') {
                Some((name, rest)) => match rest.strip_suffix(']').and_then(Op::from_suffix) {
                    Some(op) => (name, op),
                    None => continue,
                },
                None => (key.as_str(), Op::Eq),
            };
            let Some(field) = schema.field(name) else {
                continue;
            };
            filters.push(Filter {
                column: field.column,
                op,
                value: FilterValue::parse(field, &params[key])?,
            });
        }

        let sort = parse_sort(
            schema,
            params
                .get("sort")
                .map(String::as_str)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(schema.default_sort),
        );

        let projection = match params.get("fields") {
            Some(raw) => Projection::parse(raw)?,
            None => Projection::All,
        };

        let pagination = match (params.get("page"), params.get("limit")) {
            (Some(page), Some(limit)) => Some(Pagination::new(
                parse_count("page", page)?,
                parse_count("limit", limit)?,
            )),
            _ => None,
        };

        Ok(Self {
            filters,
            sort,
            projection,
            pagination,
        })
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Known fields of `raw`, or the schema default when none is known.
fn parse_sort(schema: &Schema, raw: &str) -> Vec<SortKey> {
    let keys = sort_keys(schema, raw);
    if keys.is_empty() {
        sort_keys(schema, schema.default_sort)
    } else {
        keys
    }
}

fn sort_keys(schema: &Schema, raw: &str) -> Vec<SortKey> {
    split_list(raw)
        .filter_map(|part| {
            let (name, direction) = match part.strip_prefix('-') {
                Some(name) => (name, Direction::Desc),
                None => (part, Direction::Asc),
            };
            schema.field(name).map(|f| SortKey {
                column: f.column,
                direction,
            })
        })
        .collect()
}

fn parse_count(field: &'static str, raw: &str) -> Result<u32, ValidationError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ValidationError::format(field, "must be a positive integer"))
}
