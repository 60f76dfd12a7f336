use serde::{Deserialize, Serialize};

use super::push_query;

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub size: u32,
    /// Zero-based page index
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub last: bool,
    #[serde(default)]
    pub number_of_elements: u32,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        !self.last && self.number + 1 < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        !self.first && self.number > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl PageParams {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: Some(page),
            size: Some(size),
            ..Default::default()
        }
    }

    pub(crate) fn append_query(&self, query: &mut Vec<(String, String)>) {
        push_query(query, "page", self.page);
        push_query(query, "size", self.size);
        push_query(query, "sortBy", self.sort_by.as_deref());
        push_query(query, "sortOrder", self.sort_order.as_deref());
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        self.append_query(&mut query);
        query
    }
}
