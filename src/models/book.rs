use serde::{Deserialize, Serialize};

use super::{push_query, PageParams};

/// Minimum average rating for the top-rated listing
pub const TOP_RATED_MIN_RATING: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub total_reviews: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Catalog filters plus pagination for `GET /books`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookSearchParams {
    pub page: PageParams,
    pub search: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub genres: Vec<String>,
    pub published_year: Option<i32>,
    pub min_published_year: Option<i32>,
    pub max_published_year: Option<i32>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub min_reviews: Option<u32>,
}

impl BookSearchParams {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        self.page.append_query(&mut query);
        push_query(&mut query, "search", self.search.as_deref());
        push_query(&mut query, "title", self.title.as_deref());
        push_query(&mut query, "author", self.author.as_deref());
        // Repeated key, one entry per genre
        for genre in &self.genres {
            query.push(("genres".to_string(), genre.clone()));
        }
        push_query(&mut query, "publishedYear", self.published_year);
        push_query(&mut query, "minPublishedYear", self.min_published_year);
        push_query(&mut query, "maxPublishedYear", self.max_published_year);
        push_query(&mut query, "minRating", self.min_rating);
        push_query(&mut query, "maxRating", self.max_rating);
        push_query(&mut query, "minReviews", self.min_reviews);
        query
    }
}
