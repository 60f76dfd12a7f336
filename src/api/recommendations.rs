use super::{ApiClient, ApiRequest, ClientError};
use crate::models::{RecommendationParams, RecommendationSet, RecommendedBook, Strategy};

const TOP_RATED_PATH: &str = "/recommendations/top-rated";
const FOR_ME_PATH: &str = "/recommendations/for-me";

/// Endpoint and query used to serve a strategy
///
/// The backend only exposes two list endpoints; trending is served from the
/// top-rated list and genre-based from a filtered personal list.
fn route(strategy: Strategy, params: &RecommendationParams) -> (&'static str, RecommendationParams) {
    match strategy {
        Strategy::TopRated | Strategy::Trending => (TOP_RATED_PATH, params.clone()),
        Strategy::GenreBased => (FOR_ME_PATH, RecommendationParams::genre_based()),
        Strategy::SimilarUsers | Strategy::Personalized | Strategy::AiPowered => {
            (FOR_ME_PATH, params.clone())
        }
    }
}

pub async fn for_strategy(
    client: &ApiClient,
    strategy: Strategy,
    params: &RecommendationParams,
) -> Result<RecommendationSet, ClientError> {
    let (path, params) = route(strategy, params);
    let recommendations: Vec<RecommendedBook> = client
        .fetch(ApiRequest::get(path).query(params.to_query()))
        .await?;

    tracing::debug!("{} {} recommendations", recommendations.len(), strategy);
    Ok(RecommendationSet::new(strategy, recommendations))
}
