//! Wire types shared by the endpoint wrappers
//!
//! Field names follow the backend's camelCase JSON. Timestamps are kept as
//! the strings the server sends; ids are numeric.

pub mod auth;
pub mod book;
pub mod page;
pub mod recommendation;
pub mod review;
pub mod user;

pub use auth::{AuthResponse, LoginRequest, RefreshResponse, RegisterRequest, User};
pub use book::{Book, BookSearchParams};
pub use page::{Page, PageParams};
pub use recommendation::{RecommendationParams, RecommendationSet, RecommendedBook, Strategy};
pub use review::{NewReview, Review, ReviewFilters, ReviewStats, ReviewUpdate};
pub use user::{FavoriteBook, FavoriteToggle, ProfileUpdate, UserProfile, UserStats};

/// Append `key=value` to a query list when the value is present
pub(crate) fn push_query<T: ToString>(query: &mut Vec<(String, String)>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        query.push((key.to_string(), value.to_string()));
    }
}
