//! Field-extraction expressions.
//!
//! Definitions describe where each field lives with a small closed grammar:
//!
//! ```text
//! expr      = ["^"] step (" > " step)* [" | " terminal]
//! step      = tag ["[" predicate ("," predicate)* "]"] [":" N | ":*" [start ["/" every]]]
//! predicate = attr "=" value ("|" value)*
//! terminal  = "text" | "attr(" name ")"
//! ```
//!
//! `table[class=results] > tr:*1` selects every row but the first, `td:1`
//! the second cell of a row, `a[href] | attr(href)` is not valid (predicates
//! always compare values) while `a:0 | attr(href)` is. `*` as a tag matches
//! any element. A leading `^` evaluates a field from the document root
//! instead of the current row.
//!
//! Expressions are parsed once when definitions load; anything outside the
//! grammar is rejected there.

use thiserror::Error;

use super::node::MarkupNode;

/// Errors raised while parsing an expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid expression '{expr}': {reason}")]
pub struct SelectorError {
    pub expr: String,
    pub reason: String,
}

impl SelectorError {
    fn new(expr: &str, reason: impl Into<String>) -> Self {
        Self {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}

/// Which matches of a step are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// Only the n-th match (0-based).
    Nth(usize),
    /// Every `every`-th match starting at `start`.
    All { start: usize, every: usize },
}

/// `attr=v1|v2`: the attribute's whitespace-separated tokens contain one of the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPredicate {
    pub name: String,
    pub values: Vec<String>,
}

impl AttrPredicate {
    fn matches(&self, node: &MarkupNode) -> bool {
        node.attr(&self.name).is_some_and(|value| {
            value
                .split_whitespace()
                .any(|token| self.values.iter().any(|v| v == token))
        })
    }
}

/// The closed expression grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Select {
        tag: String,
        index: Index,
        predicates: Vec<AttrPredicate>,
    },
    Attribute(String),
    Text,
    Compose(Vec<Selector>),
}

/// A validated expression, ready to run against parsed pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryExpr {
    /// Evaluate from the document root rather than the row.
    pub anchored: bool,
    pub selector: Selector,
}

impl QueryExpr {
    /// Parse a row expression: element steps only, `*` indices allowed.
    pub fn parse_rows(text: &str) -> Result<Self, SelectorError> {
        let expr = Self::parse(text)?;
        if expr.anchored {
            return Err(SelectorError::new(text, "row expressions cannot be anchored"));
        }
        if expr.terminal().is_some() {
            return Err(SelectorError::new(
                text,
                "row expressions must select elements",
            ));
        }
        Ok(expr)
    }

    /// Parse a field expression: single matches only, ending in a terminal
    /// (`text` when omitted).
    pub fn parse_field(text: &str) -> Result<Self, SelectorError> {
        let expr = Self::parse(text)?;
        if expr
            .steps()
            .iter()
            .any(|s| matches!(s, Selector::Select { index: Index::All { .. }, .. }))
        {
            return Err(SelectorError::new(
                text,
                "field expressions must select a single element per step",
            ));
        }
        Ok(expr)
    }

    fn parse(text: &str) -> Result<Self, SelectorError> {
        let trimmed = text.trim();
        let (anchored, body) = match trimmed.strip_prefix('^') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };

        let parts = split_top_level(body, '|');
        if parts.len() > 2 {
            return Err(SelectorError::new(text, "more than one terminal"));
        }

        let mut steps = Vec::new();
        let path = parts[0].trim();
        if !path.is_empty() {
            for step in split_top_level(path, '>') {
                steps.push(parse_step(text, step.trim())?);
            }
        }

        if let Some(terminal) = parts.get(1) {
            steps.push(parse_terminal(text, terminal.trim())?);
        }

        if steps.is_empty() {
            return Err(SelectorError::new(text, "empty expression"));
        }

        Ok(Self {
            anchored,
            selector: Selector::Compose(steps),
        })
    }

    fn steps(&self) -> &[Selector] {
        match &self.selector {
            Selector::Compose(steps) => steps,
            other => std::slice::from_ref(other),
        }
    }

    fn terminal(&self) -> Option<&Selector> {
        self.steps()
            .last()
            .filter(|s| matches!(s, Selector::Text | Selector::Attribute(_)))
    }

    /// Elements selected from `start`, in document order.
    pub fn select<'a>(&self, start: &'a MarkupNode) -> Vec<&'a MarkupNode> {
        let mut current = vec![start];
        for step in self.steps() {
            if let Selector::Select {
                tag,
                index,
                predicates,
            } = step
            {
                current = current
                    .into_iter()
                    .flat_map(|node| select_step(node, tag, *index, predicates))
                    .collect();
            }
        }
        current
    }

    /// Evaluate a field against a row. Missing nodes yield an empty string.
    pub fn value(&self, row: &MarkupNode, document: &MarkupNode) -> String {
        let start = if self.anchored { document } else { row };
        let Some(node) = self.select(start).into_iter().next() else {
            return String::new();
        };
        match self.terminal() {
            Some(Selector::Attribute(name)) => node.attr(name).unwrap_or_default().trim().to_string(),
            _ => node.text_content().trim().to_string(),
        }
    }
}

fn select_step<'a>(
    node: &'a MarkupNode,
    tag: &str,
    index: Index,
    predicates: &[AttrPredicate],
) -> Vec<&'a MarkupNode> {
    let matches = node.descendants().filter(|n| {
        n.is_element() && (tag == "*" || n.name == tag) && predicates.iter().all(|p| p.matches(n))
    });
    match index {
        Index::Nth(n) => matches.skip(n).take(1).collect(),
        Index::All { start, every } => matches.skip(start).step_by(every.max(1)).collect(),
    }
}

fn parse_step(expr: &str, step: &str) -> Result<Selector, SelectorError> {
    let tag_end = step
        .find(|c: char| c == '[' || c == ':')
        .unwrap_or(step.len());
    let tag = step[..tag_end].trim().to_ascii_lowercase();
    if tag.is_empty() {
        return Err(SelectorError::new(expr, "missing tag name"));
    }
    if tag != "*"
        && !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SelectorError::new(expr, format!("bad tag name '{}'", tag)));
    }

    let mut rest = &step[tag_end..];
    let mut predicates = Vec::new();
    if let Some(inner) = rest.strip_prefix('[') {
        let close = inner
            .find(']')
            .ok_or_else(|| SelectorError::new(expr, "unclosed '['"))?;
        for raw in inner[..close].split(',') {
            predicates.push(parse_predicate(expr, raw.trim())?);
        }
        rest = &inner[close + 1..];
    }

    let index = match rest.strip_prefix(':') {
        None if rest.is_empty() => Index::Nth(0),
        None => return Err(SelectorError::new(expr, format!("unexpected '{}'", rest))),
        Some(raw) => parse_index(expr, raw.trim())?,
    };

    Ok(Selector::Select {
        tag,
        index,
        predicates,
    })
}

fn parse_predicate(expr: &str, raw: &str) -> Result<AttrPredicate, SelectorError> {
    let (name, values) = raw
        .split_once('=')
        .ok_or_else(|| SelectorError::new(expr, format!("predicate '{}' needs a value", raw)))?;
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(SelectorError::new(expr, "predicate without attribute name"));
    }
    let values: Vec<String> = values
        .split('|')
        .map(|v| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(SelectorError::new(expr, format!("predicate '{}' has no values", name)));
    }
    Ok(AttrPredicate { name, values })
}

fn parse_index(expr: &str, raw: &str) -> Result<Index, SelectorError> {
    let number = |s: &str| {
        s.trim()
            .parse::<usize>()
            .map_err(|_| SelectorError::new(expr, format!("bad index '{}'", s)))
    };
    match raw.strip_prefix('*') {
        None => Ok(Index::Nth(number(raw)?)),
        Some("") => Ok(Index::All { start: 0, every: 1 }),
        Some(range) => {
            let (start, every) = match range.split_once('/') {
                Some((start, every)) => (number(start)?, number(every)?),
                None => (number(range)?, 1),
            };
            if every == 0 {
                return Err(SelectorError::new(expr, "stride cannot be 0"));
            }
            Ok(Index::All { start, every })
        }
    }
}

fn parse_terminal(expr: &str, terminal: &str) -> Result<Selector, SelectorError> {
    if terminal == "text" {
        return Ok(Selector::Text);
    }
    let name = terminal
        .strip_prefix("attr(")
        .and_then(|s| s.strip_suffix(')'))
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SelectorError::new(expr, format!("unknown terminal '{}'", terminal)))?;
    Ok(Selector::Attribute(name))
}

/// Split on `sep` outside of `[...]`.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_html;

    const PAGE: &str = r#"
        <div id="head"><span class="count">3 results</span></div>
        <table class="table-list striped">
          <tr><th>Name</th><th>Size</th></tr>
          <tr><td class="name"><a href="/t/1">Movie 1080p</a></td><td>1.4 GB</td><td class="seeds">12</td></tr>
          <tr><td class="name"><a href="/t/2">Movie 720p</a></td><td>700 MB</td><td class="seeds">5</td></tr>
          <tr><td class="name"><a href="magnet:?xt=urn:btih:ABC">Movie CAM</a></td><td>300 MB</td></tr>
        </table>"#;

    #[test]
    fn test_parse_structure() {
        let expr = QueryExpr::parse_rows("table[class=table-list|other] > tr:*1").unwrap();
        assert!(!expr.anchored);
        assert_eq!(
            expr.selector,
            Selector::Compose(vec![
                Selector::Select {
                    tag: "table".into(),
                    index: Index::Nth(0),
                    predicates: vec![AttrPredicate {
                        name: "class".into(),
                        values: vec!["table-list".into(), "other".into()],
                    }],
                },
                Selector::Select {
                    tag: "tr".into(),
                    index: Index::All { start: 1, every: 1 },
                    predicates: vec![],
                },
            ])
        );

        let field = QueryExpr::parse_field("^ div[id=head] > span | attr(class)").unwrap();
        assert!(field.anchored);
        assert_eq!(field.terminal(), Some(&Selector::Attribute("class".into())));
    }

    #[test]
    fn test_rows_and_fields() {
        let doc = parse_html(PAGE);
        let rows = QueryExpr::parse_rows("table[class=table-list] > tr:*1")
            .unwrap()
            .select(&doc);
        assert_eq!(rows.len(), 3);

        let name = QueryExpr::parse_field("td:0 > a").unwrap();
        let link = QueryExpr::parse_field("a | attr(href)").unwrap();
        let size = QueryExpr::parse_field("td:1 | text").unwrap();
        let seeds = QueryExpr::parse_field("td[class=seeds]").unwrap();

        assert_eq!(name.value(rows[0], &doc), "Movie 1080p");
        assert_eq!(link.value(rows[0], &doc), "/t/1");
        assert_eq!(size.value(rows[1], &doc), "700 MB");
        assert_eq!(seeds.value(rows[1], &doc), "5");
        assert_eq!(link.value(rows[2], &doc), "magnet:?xt=urn:btih:ABC");
        // missing cell degrades to empty
        assert_eq!(seeds.value(rows[2], &doc), "");
    }

    #[test]
    fn test_stride_and_wildcard() {
        let doc = parse_html(PAGE);
        let every_other = QueryExpr::parse_rows("tr:*0/2").unwrap().select(&doc);
        assert_eq!(every_other.len(), 2);

        let cells = QueryExpr::parse_rows("tr:1 > *:*").unwrap().select(&doc);
        // td, a, td, td in document order
        assert_eq!(cells.len(), 4);
    }

    #[test]
    fn test_anchored_field_reads_document() {
        let doc = parse_html(PAGE);
        let rows = QueryExpr::parse_rows("tr:*1").unwrap().select(&doc);
        let count = QueryExpr::parse_field("^span[class=count]").unwrap();
        assert_eq!(count.value(rows[0], &doc), "3 results");
    }

    #[test]
    fn test_predicate_matches_whitespace_tokens() {
        let doc = parse_html(PAGE);
        let exact = QueryExpr::parse_rows("table[class=striped]").unwrap();
        assert_eq!(exact.select(&doc).len(), 1);
        let partial = QueryExpr::parse_rows("table[class=strip]").unwrap();
        assert!(partial.select(&doc).is_empty());
    }

    #[test]
    fn test_invalid_expressions_rejected() {
        for bad in [
            "",
            "item.find('td')",
            "td:x",
            "td[class]",
            "td[class=]",
            "td[class=a",
            "td | href",
            "td | text | text",
            "td:*0/0",
            "> td",
        ] {
            assert!(QueryExpr::parse_field(bad).is_err(), "accepted {:?}", bad);
        }
        assert!(QueryExpr::parse_rows("tr | text").is_err());
        assert!(QueryExpr::parse_rows("^tr").is_err());
        assert!(QueryExpr::parse_field("tr:*1").is_err());
    }
}
