use super::{ApiClient, ApiRequest, ClientError};
use crate::models::{FavoriteBook, FavoriteToggle, Page, PageParams, ProfileUpdate, UserProfile, UserStats};

pub async fn profile(client: &ApiClient) -> Result<UserProfile, ClientError> {
    client.fetch(ApiRequest::get("/users/my-profile")).await
}

pub async fn update_profile(
    client: &ApiClient,
    update: &ProfileUpdate,
) -> Result<UserProfile, ClientError> {
    if update.is_empty() {
        return Err(ClientError::Validation("Nothing to update".to_string()));
    }
    client
        .fetch(ApiRequest::put("/users/my-profile").json(update)?)
        .await
}

/// Reading statistics; the backend has no dedicated endpoint so these come from the profile
pub async fn stats(client: &ApiClient) -> Result<UserStats, ClientError> {
    let profile = profile(client).await?;
    Ok(UserStats::from(&profile))
}

pub async fn favorites(
    client: &ApiClient,
    page: &PageParams,
) -> Result<Page<FavoriteBook>, ClientError> {
    client
        .fetch(ApiRequest::get("/users/my-favorites").query(page.to_query()))
        .await
}

fn favorite_path(book_id: i64) -> String {
    format!("/users/favorites/books/{}", book_id)
}

pub async fn add_favorite(client: &ApiClient, book_id: i64) -> Result<FavoriteToggle, ClientError> {
    client.execute(ApiRequest::post(favorite_path(book_id))).await?;
    Ok(FavoriteToggle::added())
}

pub async fn remove_favorite(
    client: &ApiClient,
    book_id: i64,
) -> Result<FavoriteToggle, ClientError> {
    client.execute(ApiRequest::delete(favorite_path(book_id))).await?;
    Ok(FavoriteToggle::removed())
}

/// Whether the book is in the user's favorites
///
/// Lookup failures other than an expired session read as "not a favorite".
pub async fn is_favorite(client: &ApiClient, book_id: i64) -> Result<bool, ClientError> {
    let request = ApiRequest::get(format!("{}/check", favorite_path(book_id)));
    match client.fetch(request).await {
        Ok(favorite) => Ok(favorite),
        Err(e) if e.is_unauthorized() => Err(e),
        Err(e) => {
            tracing::warn!("Failed to check favorite status of book {}: {}", book_id, e);
            Ok(false)
        }
    }
}

pub async fn toggle_favorite(
    client: &ApiClient,
    book_id: i64,
) -> Result<FavoriteToggle, ClientError> {
    if is_favorite(client, book_id).await? {
        remove_favorite(client, book_id).await
    } else {
        add_favorite(client, book_id).await
    }
}
