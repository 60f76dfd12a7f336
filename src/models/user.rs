use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::auth::UserRole;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReview {
    pub id: i64,
    pub book_id: i64,
    pub rating: u8,
    #[serde(default, alias = "reviewText")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub preferred_genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub total_reviews: u32,
    #[serde(default)]
    pub total_favorite_books: u32,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub recent_reviews: Vec<ProfileReview>,
}

/// Partial profile update; absent fields are left untouched by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_genres: Option<Vec<String>>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.bio.is_none()
            && self.preferred_genres.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_reviews: u32,
    pub total_favorite_books: u32,
    pub average_rating: f64,
    pub genre_distribution: BTreeMap<String, u32>,
    pub reviews_this_month: u32,
    pub favorite_genres: Vec<String>,
}

impl From<&UserProfile> for UserStats {
    fn from(profile: &UserProfile) -> Self {
        Self {
            total_reviews: profile.total_reviews,
            total_favorite_books: profile.total_favorite_books,
            average_rating: profile.average_rating,
            genre_distribution: BTreeMap::new(),
            reviews_this_month: 0,
            favorite_genres: profile.preferred_genres.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteBook {
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
    pub added_to_favorites_at: Option<String>,
    #[serde(default)]
    pub has_user_reviewed: bool,
}

/// Outcome of adding, removing or toggling a favorite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggle {
    pub is_favorite: bool,
    pub message: String,
}

impl FavoriteToggle {
    pub fn added() -> Self {
        Self {
            is_favorite: true,
            message: "Book added to favorites".to_string(),
        }
    }

    pub fn removed() -> Self {
        Self {
            is_favorite: false,
            message: "Book removed from favorites".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_derived_from_profile() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"id":1,"email":"a@b.c","firstName":"Ada","lastName":"Lovelace",
                "preferredGenres":["FANTASY"],"totalReviews":3,"totalFavoriteBooks":2,
                "averageRating":4.2,
                "recentReviews":[{"id":4,"bookId":5,"rating":4,"reviewText":"Great read"}]}"#,
        )
        .unwrap();
        let stats = UserStats::from(&profile);

        assert_eq!(profile.recent_reviews[0].text, "Great read");
        assert_eq!(stats.total_reviews, 3);
        assert_eq!(stats.favorite_genres, vec!["FANTASY".to_string()]);
        assert_eq!(stats.reviews_this_month, 0);
    }

    #[test]
    fn test_profile_update_skips_absent_fields() {
        let update = ProfileUpdate {
            bio: Some("Reader".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).unwrap();

        assert!(!update.is_empty());
        assert_eq!(value.as_object().unwrap().len(), 1);
        assert!(ProfileUpdate::default().is_empty());
    }
}
