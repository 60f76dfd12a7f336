use super::{ApiClient, ApiRequest, ClientError};
use crate::models::{NewReview, Page, PageParams, Review, ReviewFilters, ReviewStats, ReviewUpdate};

/// Page size used when pulling every review of a book for statistics
const STATS_PAGE_SIZE: u32 = 1000;

pub async fn list(client: &ApiClient, filters: &ReviewFilters) -> Result<Page<Review>, ClientError> {
    client
        .fetch(ApiRequest::get("/reviews").query(filters.to_query()))
        .await
}

pub async fn get(client: &ApiClient, id: i64) -> Result<Review, ClientError> {
    client.fetch(ApiRequest::get(format!("/reviews/{}", id))).await
}

pub async fn create(client: &ApiClient, review: &NewReview) -> Result<Review, ClientError> {
    review.validate().map_err(ClientError::Validation)?;
    client
        .fetch(ApiRequest::post("/reviews").json(review)?)
        .await
}

pub async fn update(client: &ApiClient, id: i64, update: &ReviewUpdate) -> Result<Review, ClientError> {
    update.validate().map_err(ClientError::Validation)?;
    client
        .fetch(ApiRequest::put(format!("/reviews/{}", id)).json(update)?)
        .await
}

pub async fn delete(client: &ApiClient, id: i64) -> Result<(), ClientError> {
    client.execute(ApiRequest::delete(format!("/reviews/{}", id))).await?;
    Ok(())
}

pub async fn for_book(
    client: &ApiClient,
    book_id: i64,
    page: &PageParams,
) -> Result<Page<Review>, ClientError> {
    client
        .fetch(ApiRequest::get(format!("/reviews/book/{}", book_id)).query(page.to_query()))
        .await
}

pub async fn for_user(
    client: &ApiClient,
    user_id: i64,
    page: &PageParams,
) -> Result<Page<Review>, ClientError> {
    client
        .fetch(ApiRequest::get(format!("/reviews/user/{}", user_id)).query(page.to_query()))
        .await
}

/// Reviews written by the logged-in user
pub async fn mine(client: &ApiClient, page: &PageParams) -> Result<Page<Review>, ClientError> {
    client
        .fetch(ApiRequest::get("/reviews/my-reviews").query(page.to_query()))
        .await
}

/// The logged-in user's review of a book, `None` if they haven't written one
pub async fn mine_for_book(client: &ApiClient, book_id: i64) -> Result<Option<Review>, ClientError> {
    match client
        .fetch(ApiRequest::get(format!("/reviews/my-review/book/{}", book_id)))
        .await
    {
        Ok(review) => Ok(Some(review)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn has_reviewed(client: &ApiClient, book_id: i64) -> Result<bool, ClientError> {
    client
        .fetch(ApiRequest::get(format!("/reviews/has-reviewed/book/{}", book_id)))
        .await
}

/// Rating summary computed from the book's reviews
pub async fn stats_for_book(client: &ApiClient, book_id: i64) -> Result<ReviewStats, ClientError> {
    let page = PageParams {
        size: Some(STATS_PAGE_SIZE),
        ..Default::default()
    };
    let reviews = for_book(client, book_id, &page).await?;
    Ok(ReviewStats::from_reviews(&reviews.content))
}
