use super::{ApiClient, ApiRequest, ClientError};
use crate::models::book::TOP_RATED_MIN_RATING;
use crate::models::{Book, BookSearchParams, Page};

/// Paginated catalog listing with optional filters
pub async fn list(client: &ApiClient, params: &BookSearchParams) -> Result<Page<Book>, ClientError> {
    let page: Page<Book> = client
        .fetch(ApiRequest::get("/books").query(params.to_query()))
        .await?;

    tracing::debug!(
        "Fetched books page {} of {} ({} total)",
        page.number + 1,
        page.total_pages,
        page.total_elements
    );
    Ok(page)
}

pub async fn get(client: &ApiClient, id: i64) -> Result<Book, ClientError> {
    client.fetch(ApiRequest::get(format!("/books/{}", id))).await
}

/// Match title or author
pub async fn search(
    client: &ApiClient,
    query: &str,
    params: &BookSearchParams,
) -> Result<Page<Book>, ClientError> {
    let params = BookSearchParams {
        search: Some(query.to_string()),
        ..params.clone()
    };
    list(client, &params).await
}

pub async fn by_genre(
    client: &ApiClient,
    genre: &str,
    params: &BookSearchParams,
) -> Result<Page<Book>, ClientError> {
    let params = BookSearchParams {
        genres: vec![genre.to_uppercase()],
        ..params.clone()
    };
    list(client, &params).await
}

pub async fn top_rated(
    client: &ApiClient,
    params: &BookSearchParams,
) -> Result<Page<Book>, ClientError> {
    let params = BookSearchParams {
        min_rating: Some(TOP_RATED_MIN_RATING),
        ..params.clone()
    };
    list(client, &params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{scripted_client, ScriptedTransport};
    use crate::models::PageParams;
    use crate::session::MemorySessionStore;
    use std::sync::Arc;

    const PAGE: &str = r#"{"content":[{"id":5,"title":"Dune","author":"Frank Herbert"}],
        "totalElements":1,"totalPages":1,"size":20,"number":0,"first":true,"last":true,
        "numberOfElements":1}"#;

    fn client(responses: Vec<(u16, &str)>) -> (ApiClient, Arc<ScriptedTransport>) {
        scripted_client(responses, Arc::new(MemorySessionStore::new()))
    }

    #[tokio::test]
    async fn test_search_sets_query() {
        let (client, transport) = client(vec![(200, PAGE)]);
        let params = BookSearchParams {
            page: PageParams::new(0, 20),
            ..Default::default()
        };

        let page = search(&client, "dune", &params).await.unwrap();

        assert_eq!(page.content[0].title, "Dune");
        let sent = &transport.sent()[0];
        assert_eq!(sent.path, "/books");
        assert!(sent.query.contains(&("search".to_string(), "dune".to_string())));
        assert!(sent.query.contains(&("size".to_string(), "20".to_string())));
    }

    #[tokio::test]
    async fn test_genre_and_top_rated_filters() {
        let (client, transport) = client(vec![(200, PAGE), (200, PAGE)]);

        by_genre(&client, "fantasy", &BookSearchParams::default()).await.unwrap();
        top_rated(&client, &BookSearchParams::default()).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].query, vec![("genres".to_string(), "FANTASY".to_string())]);
        assert_eq!(sent[1].query, vec![("minRating".to_string(), "4".to_string())]);
    }

    #[tokio::test]
    async fn test_get_missing_book() {
        let (client, transport) = client(vec![(404, r#"{"message":"Book not found"}"#)]);

        let error = get(&client, 99).await.unwrap_err();

        assert!(error.is_not_found());
        assert_eq!(transport.sent()[0].path, "/books/99");
    }
}
