use std::collections::HashMap;

use crate::app::{Result, RythmError};

pub const QUERY_PARAMS: [&str; 5] = ["todo_id", "user_id", "search", "username", "category"];

/// Exact-match filters plus an optional full-text search term.
///
/// With `search` set the store switches to relevance ordering and the
/// filters become extra constraints next to the text predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoQuery {
    pub todo_id: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl TodoQuery {
    /// Build a query from raw request parameters, rejecting anything
    /// outside [`QUERY_PARAMS`].
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        if params.is_empty() {
            return Err(RythmError::Validation(
                "No query present with request".to_string(),
            ));
        }

        if params.keys().any(|k| !QUERY_PARAMS.contains(&k.as_str())) {
            return Err(RythmError::Validation(format!(
                "'{}' are the only valid query parameters",
                QUERY_PARAMS.join(",")
            )));
        }

        let get = |key: &str| params.get(key).cloned();
        Ok(Self {
            todo_id: get("todo_id"),
            user_id: get("user_id"),
            username: get("username"),
            category: get("category"),
            search: get("search").filter(|s| !s.trim().is_empty()),
        })
    }

    pub fn is_search(&self) -> bool {
        self.search.is_some()
    }
}
