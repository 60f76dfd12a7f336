use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{push_query, PageParams};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
const MIN_TEXT_LEN: usize = 10;
const MAX_TEXT_LEN: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub book_id: i64,
    #[serde(default)]
    pub book_title: String,
    pub user_id: i64,
    #[serde(default)]
    pub user_first_name: String,
    #[serde(default)]
    pub user_last_name: String,
    pub rating: u8,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub book_id: i64,
    pub rating: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewUpdate {
    pub rating: u8,
    pub text: String,
}

fn validate_review(rating: u8, text: &str) -> Result<(), String> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(format!(
            "Rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        ));
    }
    let len = text.trim().chars().count();
    if len < MIN_TEXT_LEN {
        return Err(format!("Review must be at least {} characters", MIN_TEXT_LEN));
    }
    if len > MAX_TEXT_LEN {
        return Err(format!("Review must be less than {} characters", MAX_TEXT_LEN));
    }
    Ok(())
}

impl NewReview {
    pub fn validate(&self) -> Result<(), String> {
        validate_review(self.rating, &self.text)
    }
}

impl ReviewUpdate {
    pub fn validate(&self) -> Result<(), String> {
        validate_review(self.rating, &self.text)
    }
}

/// Filters for `GET /reviews`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFilters {
    pub page: PageParams,
    pub book_id: Option<i64>,
    pub user_id: Option<i64>,
    pub rating: Option<u8>,
    pub min_rating: Option<u8>,
}

impl ReviewFilters {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        self.page.append_query(&mut query);
        push_query(&mut query, "bookId", self.book_id);
        push_query(&mut query, "userId", self.user_id);
        push_query(&mut query, "rating", self.rating);
        push_query(&mut query, "minRating", self.min_rating);
        query
    }
}

/// Aggregate figures for one book's reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub total_reviews: usize,
    pub average_rating: f64,
    /// Count per star value, always containing keys 1 to 5
    pub rating_distribution: BTreeMap<u8, usize>,
}

impl ReviewStats {
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let mut rating_distribution: BTreeMap<u8, usize> =
            (MIN_RATING..=MAX_RATING).map(|r| (r, 0)).collect();
        let mut sum = 0u64;

        for review in reviews {
            *rating_distribution.entry(review.rating).or_insert(0) += 1;
            sum += u64::from(review.rating);
        }

        let total_reviews = reviews.len();
        let average_rating = if total_reviews > 0 {
            sum as f64 / total_reviews as f64
        } else {
            0.0
        };

        Self {
            total_reviews,
            average_rating,
            rating_distribution,
        }
    }
}
