//! Compiled source definitions.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::markup::{validate_path, QueryExpr};
use crate::searcher::MediaKind;

use super::alias::root_of;
use super::DefinitionError;

/// Suffixes of the numbered keyword templates.
const TEMPLATE_SUFFIXES: [&str; 4] = ["", "2", "3", "4"];

/// One keyword template with its tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTemplate {
    pub keywords: String,
    pub extra: String,
    /// 1 for primary templates, increasing for each fallback.
    pub priority: u32,
}

/// Where fields of an HTML result row live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlParser {
    /// Scopes the row search to the first match.
    pub key: Option<QueryExpr>,
    pub rows: QueryExpr,
    pub name: QueryExpr,
    pub torrent: QueryExpr,
    pub info_hash: Option<QueryExpr>,
    pub size: Option<QueryExpr>,
    pub seeds: Option<QueryExpr>,
    pub peers: Option<QueryExpr>,
    pub referer: Option<QueryExpr>,
    pub id: Option<QueryExpr>,
}

/// Record keys of a JSON API source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiFormat {
    /// Dotted path to the record array; empty for a root array.
    pub results: String,
    pub subresults: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub torrent: Option<String>,
    pub info_hash: Option<String>,
    pub quality: Option<String>,
    pub size: Option<String>,
    pub seeds: Option<String>,
    pub peers: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Html(HtmlParser),
    Api(ApiFormat),
}

/// How detail pages are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubpageMode {
    Plain,
    /// Sends `X-Requested-With: XMLHttpRequest`.
    Xhr,
}

/// Authentication steps of a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRecipe {
    /// Path under `base_url` returning `{"token": ...}` for `TOKEN`.
    pub token: Option<String>,
    /// Page fetched before every query.
    pub initial_url: Option<String>,
    pub login_path: Option<String>,
    /// Form fields with `USERNAME`, `PASSWORD` and `CSRF_TOKEN` placeholders.
    pub login_object: Vec<(String, String)>,
    pub login_headers: Vec<(String, String)>,
    /// Marker in a response body that means the login failed.
    pub login_failed: Option<String>,
    pub csrf_token: bool,
    /// Path under `root_url` returning an Authorization token.
    pub token_auth: Option<String>,
}

/// A validated per-source descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDefinition {
    pub id: String,
    pub name: String,
    pub color: String,
    pub enabled: bool,
    pub predefined: bool,
    pub custom: bool,
    pub private: bool,
    pub base_url: String,
    pub root_url: String,
    pub queries: BTreeMap<MediaKind, String>,
    pub templates: BTreeMap<MediaKind, Vec<KeywordTemplate>>,
    pub extraction: Extraction,
    /// Prefix for API torrent fields.
    pub download_path: String,
    pub subpage: Option<SubpageMode>,
    pub filter_title: bool,
    pub charset: String,
    pub response_charset: Option<String>,
    pub separator: String,
    pub language: Option<String>,
    pub languages: Vec<String>,
    pub remove_special_characters: String,
    pub auth: AuthRecipe,
    pub headers: Vec<(String, String)>,
    pub post_data: Vec<(String, String)>,
    pub get_data: Vec<(String, String)>,
}

impl SourceDefinition {
    /// Validate a merged definition document. Missing optional keys take
    /// their defaults; a broken expression rejects the whole source.
    pub fn compile(id: &str, value: &Value) -> Result<Self, DefinitionError> {
        let map = value
            .as_object()
            .ok_or_else(|| DefinitionError::invalid(id, "definition is not an object"))?;

        let base_url = text(map, "base_url")
            .ok_or_else(|| DefinitionError::invalid(id, "missing base_url"))?;
        let root_url = match text(map, "root_url") {
            Some(root) => root,
            None => root_of(&base_url)
                .ok_or_else(|| DefinitionError::invalid(id, format!("bad base_url '{}'", base_url)))?,
        };

        let extraction = if flag(map, "is_api") {
            Extraction::Api(compile_api(id, map)?)
        } else {
            Extraction::Html(compile_parser(id, map)?)
        };

        let subpage = flag(map, "subpage").then(|| match text(map, "subpage_mode").as_deref() {
            Some("xhr") => SubpageMode::Xhr,
            _ => SubpageMode::Plain,
        });

        let mut queries = BTreeMap::new();
        let mut templates = BTreeMap::new();
        for kind in MediaKind::ALL {
            queries.insert(kind, text(map, kind.query_key()).unwrap_or_default());
            templates.insert(kind, collect_templates(map, kind.keyword_prefix()));
        }

        Ok(Self {
            id: text(map, "id").unwrap_or_else(|| id.to_string()),
            name: text(map, "name").unwrap_or_default(),
            color: text(map, "color").unwrap_or_else(|| "FFFFFFFF".to_string()),
            enabled: flag(map, "enabled"),
            predefined: flag(map, "predefined"),
            custom: flag(map, "custom"),
            private: flag(map, "private"),
            base_url,
            root_url,
            queries,
            templates,
            extraction,
            download_path: text(map, "download_path").unwrap_or_default(),
            subpage,
            filter_title: flag(map, "filter_title"),
            charset: text(map, "charset").unwrap_or_else(|| "utf8".to_string()),
            response_charset: text(map, "response_charset"),
            separator: text(map, "separator").unwrap_or_else(|| "%20".to_string()),
            language: text(map, "language").map(|l| l.to_lowercase()),
            languages: text(map, "languages")
                .map(|l| {
                    l.split(',')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            remove_special_characters: text(map, "remove_special_characters").unwrap_or_default(),
            auth: AuthRecipe {
                token: text(map, "token"),
                initial_url: text(map, "initial_url"),
                login_path: text(map, "login_path"),
                login_object: pairs(id, map, "login_object")?,
                login_headers: pairs(id, map, "login_headers")?,
                login_failed: text(map, "login_failed"),
                csrf_token: flag(map, "csrf_token"),
                token_auth: text(map, "token_auth"),
            },
            headers: pairs(id, map, "headers")?,
            post_data: pairs(id, map, "post_data")?,
            get_data: pairs(id, map, "get_data")?,
        })
    }

    /// Search URL template for a media kind.
    pub fn query_url(&self, kind: MediaKind) -> String {
        format!(
            "{}{}",
            self.base_url,
            self.queries.get(&kind).map(String::as_str).unwrap_or_default()
        )
    }

    pub fn templates(&self, kind: MediaKind) -> &[KeywordTemplate] {
        self.templates.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Display label with the source color, e.g. `[COLOR FFFFFFFF]Name[/COLOR]`.
    pub fn label(&self) -> String {
        format!("[COLOR {}]{}[/COLOR]", self.color, self.name)
    }

    pub fn is_api(&self) -> bool {
        matches!(self.extraction, Extraction::Api(_))
    }

    /// Whether the request charset needs non-UTF-8 percent-encoding.
    pub fn legacy_charset(&self) -> bool {
        !self.charset.to_lowercase().contains("utf")
    }
}

/// Non-empty string value. Numbers are rendered as text.
fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn flag(map: &Map<String, Value>, key: &str) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

/// Key/value pairs from an object, or from a string holding a JSON object
/// written with single quotes.
fn pairs(id: &str, map: &Map<String, Value>, key: &str) -> Result<Vec<(String, String)>, DefinitionError> {
    let object = match map.get(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::Object(object)) => object.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Map<String, Value>>(&s.replace('\'', "\""))
            .map_err(|e| DefinitionError::invalid(id, format!("{}: {}", key, e)))?,
        Some(_) => return Err(DefinitionError::invalid(id, format!("{} must be an object", key))),
    };
    Ok(object
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

fn collect_templates(map: &Map<String, Value>, prefix: &str) -> Vec<KeywordTemplate> {
    let mut templates = Vec::new();
    for suffix in TEMPLATE_SUFFIXES {
        if let Some(keywords) = text(map, &format!("{}_keywords{}", prefix, suffix)) {
            templates.push(KeywordTemplate {
                keywords,
                extra: text(map, &format!("{}_extra{}", prefix, suffix)).unwrap_or_default(),
                priority: 1,
            });
        }
    }
    let mut priority = 1;
    for suffix in TEMPLATE_SUFFIXES {
        if let Some(keywords) = text(map, &format!("{}_keywords_fallback{}", prefix, suffix)) {
            priority += 1;
            templates.push(KeywordTemplate {
                keywords,
                extra: text(map, &format!("{}_extra_fallback{}", prefix, suffix)).unwrap_or_default(),
                priority,
            });
        }
    }
    templates
}

fn compile_parser(id: &str, map: &Map<String, Value>) -> Result<HtmlParser, DefinitionError> {
    let parser = map
        .get("parser")
        .and_then(Value::as_object)
        .ok_or_else(|| DefinitionError::invalid(id, "missing parser"))?;

    let field = |key: &str| -> Result<Option<QueryExpr>, DefinitionError> {
        text(parser, key)
            .map(|expr| QueryExpr::parse_field(&expr))
            .transpose()
            .map_err(|e| DefinitionError::expression(id, key, e))
    };
    let required = |key: &str| -> Result<QueryExpr, DefinitionError> {
        field(key)?.ok_or_else(|| DefinitionError::invalid(id, format!("parser.{} is required", key)))
    };

    let rows_expr = text(parser, "row")
        .ok_or_else(|| DefinitionError::invalid(id, "parser.row is required"))?;
    let rows = QueryExpr::parse_rows(&rows_expr).map_err(|e| DefinitionError::expression(id, "row", e))?;
    let key = text(parser, "key")
        .map(|expr| QueryExpr::parse_rows(&expr))
        .transpose()
        .map_err(|e| DefinitionError::expression(id, "key", e))?;

    Ok(HtmlParser {
        key,
        rows,
        name: required("name")?,
        torrent: required("torrent")?,
        info_hash: field("infohash")?,
        size: field("size")?,
        seeds: field("seeds")?,
        peers: field("peers")?,
        referer: field("referer")?,
        id: field("id")?,
    })
}

fn compile_api(id: &str, map: &Map<String, Value>) -> Result<ApiFormat, DefinitionError> {
    let format = map
        .get("api_format")
        .and_then(Value::as_object)
        .ok_or_else(|| DefinitionError::invalid(id, "missing api_format"))?;

    let path = |key: &str| -> Result<Option<String>, DefinitionError> {
        match text(format, key) {
            Some(p) => {
                validate_path(&p).map_err(|e| DefinitionError::expression(id, key, e))?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    };

    Ok(ApiFormat {
        results: path("results")?.unwrap_or_default(),
        subresults: path("subresults")?,
        name: path("name")?,
        description: path("description")?,
        torrent: path("torrent")?,
        info_hash: path("info_hash")?,
        quality: path("quality")?,
        size: path("size")?,
        seeds: path("seeds")?,
        peers: path("peers")?,
    })
}
