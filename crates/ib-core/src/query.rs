//! # Query building
//!
//! `IdeaQuery` is the store-agnostic feed filter. `GroqQuery` turns filters
//! into GROQ text for the hosted document store, binding every caller value
//! as a `$pN` parameter so user input never becomes part of the query text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Category, Idea};

pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Feed filter: optional free text, optional category, page window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaQuery {
    pub text: Option<String>,
    pub category: Option<Category>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for IdeaQuery {
    fn default() -> Self {
        Self {
            text: None,
            category: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl IdeaQuery {
    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Case-insensitive match against title, body, author name and category.
    pub fn matches(&self, idea: &Idea) -> bool {
        if let Some(category) = self.category {
            if idea.category != category {
                return false;
            }
        }
        match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(text) => {
                let needle = text.to_lowercase();
                [
                    idea.title.as_str(),
                    idea.body.as_str(),
                    idea.author.name.as_str(),
                    idea.category.as_str(),
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Sort direction for `order(...)` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Asc,
    Desc,
}

impl Sort {
    fn as_str(&self) -> &'static str {
        match self {
            Sort::Asc => "asc",
            Sort::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Window {
    Range { offset: usize, limit: usize },
    First,
}

/// A finished query: GROQ text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub query: String,
    pub params: BTreeMap<String, Value>,
}

impl BoundQuery {
    /// Query-string pairs for the HTTP query endpoint (`$name` keys, JSON values).
    pub fn url_params(&self) -> Vec<(String, String)> {
        std::iter::once(("query".to_string(), self.query.clone()))
            .chain(
                self.params
                    .iter()
                    .map(|(name, value)| (format!("${name}"), value.to_string())),
            )
            .collect()
    }
}

/// Builder for a single-document-type selection.
///
/// Field names and projections are trusted identifiers supplied by the
/// adapter code; values always go through [`GroqQuery::bind`].
#[derive(Debug, Clone)]
pub struct GroqQuery {
    filters: Vec<String>,
    params: BTreeMap<String, Value>,
    order: Vec<String>,
    window: Option<Window>,
    projection: Option<String>,
}

impl GroqQuery {
    /// Selects documents of `doc_type`.
    pub fn documents(doc_type: &str) -> Self {
        let mut query = Self {
            filters: Vec::new(),
            params: BTreeMap::new(),
            order: Vec::new(),
            window: None,
            projection: None,
        };
        let param = query.bind(doc_type);
        query.filters.push(format!("_type == {param}"));
        query
    }

    fn bind(&mut self, value: impl Into<Value>) -> String {
        let name = format!("p{}", self.params.len());
        self.params.insert(name.clone(), value.into());
        format!("${name}")
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        debug_assert!(is_field_path(field), "untrusted field name {field:?}");
        let param = self.bind(value);
        self.filters.push(format!("{field} == {param}"));
        self
    }

    /// Prefix text match over any of `fields`. Blank text adds no filter.
    pub fn where_any_match(mut self, fields: &[&str], text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || fields.is_empty() {
            return self;
        }
        let param = self.bind(format!("{text}*"));
        let clauses: Vec<String> = fields
            .iter()
            .inspect(|f| debug_assert!(is_field_path(f), "untrusted field name {f:?}"))
            .map(|f| format!("{f} match {param}"))
            .collect();
        self.filters.push(format!("({})", clauses.join(" || ")));
        self
    }

    pub fn order_by(mut self, field: &str, sort: Sort) -> Self {
        debug_assert!(is_field_path(field), "untrusted field name {field:?}");
        self.order.push(format!("{field} {}", sort.as_str()));
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.window = Some(Window::Range { offset, limit });
        self
    }

    pub fn first(mut self) -> Self {
        self.window = Some(Window::First);
        self
    }

    pub fn project(mut self, projection: &str) -> Self {
        self.projection = Some(projection.to_string());
        self
    }

    fn selection(&self, extra: Option<&str>) -> String {
        let mut filters = self.filters.clone();
        filters.extend(extra.map(str::to_string));
        format!("*[{}]", filters.join(" && "))
    }

    pub fn build(self) -> BoundQuery {
        let mut query = self.selection(None);
        if !self.order.is_empty() {
            query.push_str(&format!(" | order({})", self.order.join(", ")));
        }
        match self.window {
            Some(Window::Range { offset, limit }) => {
                query.push_str(&format!(" [{offset}...{}]", offset + limit))
            }
            Some(Window::First) => query.push_str("[0]"),
            None => {}
        }
        if let Some(projection) = &self.projection {
            query.push(' ');
            query.push_str(projection);
        }
        BoundQuery {
            query,
            params: self.params,
        }
    }

    /// `count(*[...])`; ordering, window and projection are ignored.
    pub fn count(self) -> BoundQuery {
        BoundQuery {
            query: format!("count({})", self.selection(None)),
            params: self.params,
        }
    }

    /// `count(*[... && field == a]) - count(*[... && field == b])`.
    pub fn count_difference(
        mut self,
        field: &str,
        minuend: impl Into<Value>,
        subtrahend: impl Into<Value>,
    ) -> BoundQuery {
        debug_assert!(is_field_path(field), "untrusted field name {field:?}");
        let a = self.bind(minuend);
        let b = self.bind(subtrahend);
        let plus = self.selection(Some(&format!("{field} == {a}")));
        let minus = self.selection(Some(&format!("{field} == {b}")));
        BoundQuery {
            query: format!("count({plus}) - count({minus})"),
            params: self.params,
        }
    }
}

/// Dotted identifiers, each optionally traversing an array (`body[].children[].text`).
fn is_field_path(field: &str) -> bool {
    !field.is_empty()
        && field.split('.').all(|seg| {
            let name = seg.strip_suffix("[]").unwrap_or(seg);
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, IdeaId};
    use chrono::Utc;
    use serde_json::json;

    fn idea(title: &str, category: Category) -> Idea {
        Idea {
            id: IdeaId::from("i1"),
            title: title.into(),
            slug: crate::models::slugify(title),
            category,
            body: "A body".into(),
            notes: None,
            author: Author::anonymous(),
            published_at: Utc::now(),
            vote_tally: 0,
            comments_count: 0,
        }
    }

    #[test]
    fn user_text_is_bound_not_interpolated() {
        let hostile = r#"x" || true || "#;
        let bound = GroqQuery::documents("idea")
            .where_any_match(&["title", "author.name"], hostile)
            .build();
        assert!(!bound.query.contains(hostile));
        assert_eq!(bound.query, "*[_type == $p0 && (title match $p1 || author.name match $p1)]");
        assert_eq!(bound.params["p1"], json!(format!("{}*", hostile.trim())));
    }

    #[test]
    fn feed_query_orders_and_slices() {
        let bound = GroqQuery::documents("idea")
            .where_eq("category", "health")
            .order_by("publishedAt", Sort::Desc)
            .range(12, 12)
            .project("{ _id, title }")
            .build();
        assert_eq!(
            bound.query,
            "*[_type == $p0 && category == $p1] | order(publishedAt desc) [12...24] { _id, title }"
        );
        assert_eq!(bound.params["p0"], json!("idea"));
    }

    #[test]
    fn tally_query_subtracts_counts() {
        let bound = GroqQuery::documents("vote")
            .where_eq("ideaId", "abc")
            .count_difference("direction", "upvote", "downvote");
        assert_eq!(
            bound.query,
            "count(*[_type == $p0 && ideaId == $p1 && direction == $p2]) - count(*[_type == $p0 && ideaId == $p1 && direction == $p3])"
        );
        let pairs = bound.url_params();
        assert_eq!(pairs[0].0, "query");
        assert!(pairs.contains(&("$p2".to_string(), "\"upvote\"".to_string())));
    }

    #[test]
    fn field_paths_accept_array_traversal() {
        assert!(is_field_path("body[].children[].text"));
        assert!(is_field_path("author.name"));
        assert!(!is_field_path("title) || (true"));
        assert!(!is_field_path("a..b"));
    }

    #[test]
    fn blank_search_adds_no_filter() {
        let bound = GroqQuery::documents("idea").where_any_match(&["title"], "   ").build();
        assert_eq!(bound.query, "*[_type == $p0]");
    }

    #[test]
    fn idea_query_matches_text_and_category() {
        let q = IdeaQuery {
            text: Some("SOLAR".into()),
            category: Some(Category::Technology),
            ..IdeaQuery::default()
        };
        assert!(q.matches(&idea("Solar roof tiles", Category::Technology)));
        assert!(!q.matches(&idea("Solar roof tiles", Category::Business)));
        assert!(!q.matches(&idea("Wind farm", Category::Technology)));
        assert!(IdeaQuery::default().matches(&idea("Anything", Category::Other)));
    }
}
