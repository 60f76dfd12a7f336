use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{push_query, Book};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    TopRated,
    GenreBased,
    SimilarUsers,
    Trending,
    #[default]
    Personalized,
    AiPowered,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TopRated => "TOP_RATED",
            Strategy::GenreBased => "GENRE_BASED",
            Strategy::SimilarUsers => "SIMILAR_USERS",
            Strategy::Trending => "TRENDING",
            Strategy::Personalized => "PERSONALIZED",
            Strategy::AiPowered => "AI_POWERED",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        match normalized.as_str() {
            "TOP_RATED" => Ok(Strategy::TopRated),
            "GENRE_BASED" | "GENRE" => Ok(Strategy::GenreBased),
            "SIMILAR_USERS" => Ok(Strategy::SimilarUsers),
            "TRENDING" => Ok(Strategy::Trending),
            "PERSONALIZED" | "FOR_ME" => Ok(Strategy::Personalized),
            "AI_POWERED" => Ok(Strategy::AiPowered),
            _ => Err(format!("unknown recommendation strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedBook {
    pub book: Book,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub strategy: Option<Strategy>,
}

/// Query options for the recommendation endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RecommendationParams {
    pub limit: Option<u32>,
    pub include_top_rated: Option<bool>,
    pub include_genre_based: Option<bool>,
    pub include_ai_powered: Option<bool>,
    pub include_similar_users: Option<bool>,
    pub exclude_already_reviewed: Option<bool>,
}

impl RecommendationParams {
    /// Options sent for genre-based lists
    pub fn genre_based() -> Self {
        Self {
            limit: Some(10),
            include_top_rated: Some(false),
            include_genre_based: Some(true),
            include_ai_powered: Some(false),
            ..Default::default()
        }
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push_query(&mut query, "limit", self.limit);
        push_query(&mut query, "includeTopRated", self.include_top_rated);
        push_query(&mut query, "includeGenreBased", self.include_genre_based);
        push_query(&mut query, "includeAIPowered", self.include_ai_powered);
        push_query(&mut query, "includeSimilarUsers", self.include_similar_users);
        push_query(&mut query, "excludeAlreadyReviewed", self.exclude_already_reviewed);
        query
    }
}

/// A recommendation list tagged with the strategy that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSet {
    pub recommendations: Vec<RecommendedBook>,
    pub strategy: Strategy,
    pub total_count: usize,
    pub generated: DateTime<Utc>,
}

impl RecommendationSet {
    pub fn new(strategy: Strategy, recommendations: Vec<RecommendedBook>) -> Self {
        Self {
            total_count: recommendations.len(),
            recommendations,
            strategy,
            generated: Utc::now(),
        }
    }
}
