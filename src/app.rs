use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::api::{
    auth, books, recommendations, reviews, users, ApiClient, AuthState, ClientError,
    HttpTokenRefresher, ReqwestTransport,
};
use crate::cache::{Mutation, QueryCache, QueryKey};
use crate::config::AppConfig;
use crate::models::{
    Book, BookSearchParams, FavoriteBook, FavoriteToggle, LoginRequest, NewReview, Page,
    PageParams, ProfileUpdate, RecommendationParams, RecommendationSet, RegisterRequest, Review,
    ReviewFilters, ReviewStats, ReviewUpdate, Strategy, User, UserProfile, UserStats,
};
use crate::session::{FileSessionStore, MemorySessionStore, SessionStore};

/// Serve `key` from the cache, or fetch and remember it
async fn cached<'a, T, F, Fut>(
    cache: &mut QueryCache,
    client: &'a ApiClient,
    key: QueryKey,
    fetch: F,
) -> Result<T, ClientError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&'a ApiClient) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    if let Some(value) = cache.get(&key) {
        return Ok(value);
    }
    let value = fetch(client).await?;
    cache.insert(key, &value);
    Ok(value)
}

/// Everything a command needs: the authenticated client plus the query cache
pub struct App {
    pub config: AppConfig,
    client: ApiClient,
    cache: QueryCache,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let session: Arc<dyn SessionStore> = match config.session_path() {
            Ok(path) => {
                let store = FileSessionStore::new(path);
                tracing::debug!("Session file: {}", store.path().display());
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!("{}, the session will only last for this command", e);
                Arc::new(MemorySessionStore::new())
            }
        };

        let transport = Arc::new(
            ReqwestTransport::new(&config.api_base_url, config.timeout())
                .context("Failed to build HTTP client")?,
        );
        let refresher = Arc::new(HttpTokenRefresher::new(transport.clone()));
        let client = ApiClient::new(transport, session, refresher);
        let cache = Self::open_cache(&config);

        Ok(Self::with_client(config, client, cache))
    }

    /// Disk-backed cache when caching is on, so entries outlive one command
    fn open_cache(config: &AppConfig) -> QueryCache {
        let ttl = config.cache_ttl();
        if ttl.is_zero() {
            return QueryCache::new(ttl);
        }
        match config.cache_path() {
            Ok(path) => {
                tracing::debug!("Query cache: {}", path.display());
                QueryCache::open(path, ttl)
            }
            Err(e) => {
                tracing::warn!("{}, cached queries will only last for this command", e);
                QueryCache::new(ttl)
            }
        }
    }

    pub fn with_client(config: AppConfig, client: ApiClient, cache: QueryCache) -> Self {
        Self {
            config,
            client,
            cache,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.client.auth_state()
    }

    /// Whether any session is stored, valid or not
    pub fn has_session(&self) -> bool {
        match self.client.session().load() {
            Ok(session) => !session.is_empty(),
            Err(_) => false,
        }
    }

    /// User stored with the session, without asking the backend
    pub fn current_user(&self) -> Result<Option<User>, ClientError> {
        let session = self.client.session().load()?;
        Ok(if session.is_authenticated() {
            session.user
        } else {
            None
        })
    }

    /// Forget cached reads once the session has been torn down
    fn settle<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if result.is_err() && self.client.auth_state() == AuthState::Failed {
            self.cache.apply(Mutation::SessionChanged);
        }
        result
    }

    fn mutated<T>(&mut self, result: Result<T, ClientError>, mutation: Mutation) -> Result<T, ClientError> {
        if result.is_ok() {
            self.cache.apply(mutation);
        }
        self.settle(result)
    }

    // Auth

    pub async fn login(&mut self, email: &str, password: &str) -> Result<User, ClientError> {
        let credentials = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = auth::login(&self.client, &credentials).await;
        self.mutated(result, Mutation::SessionChanged)
    }

    pub async fn register(&mut self, form: &RegisterRequest) -> Result<User, ClientError> {
        let result = auth::register(&self.client, form).await;
        self.mutated(result, Mutation::SessionChanged)
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let result = auth::logout(&self.client).await;
        self.cache.clear();
        result
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ClientError> {
        auth::forgot_password(&self.client, email).await
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ClientError> {
        auth::reset_password(&self.client, token, new_password).await
    }

    // Books

    pub async fn books(&mut self, params: &BookSearchParams) -> Result<Page<Book>, ClientError> {
        let key = QueryKey::new(["books"]).with_query(&params.to_query());
        let result = cached(&mut self.cache, &self.client, key, |c| books::list(c, params)).await;
        self.settle(result)
    }

    pub async fn book(&mut self, id: i64) -> Result<Book, ClientError> {
        let key = QueryKey::new(["book"]).child(id);
        let result = cached(&mut self.cache, &self.client, key, |c| books::get(c, id)).await;
        self.settle(result)
    }

    pub async fn search_books(
        &mut self,
        query: &str,
        params: &BookSearchParams,
    ) -> Result<Page<Book>, ClientError> {
        let key = QueryKey::new(["books", "search", query]).with_query(&params.to_query());
        let result =
            cached(&mut self.cache, &self.client, key, |c| books::search(c, query, params)).await;
        self.settle(result)
    }

    pub async fn books_by_genre(
        &mut self,
        genre: &str,
        params: &BookSearchParams,
    ) -> Result<Page<Book>, ClientError> {
        let key = QueryKey::new(["books", "genre", genre]).with_query(&params.to_query());
        let result =
            cached(&mut self.cache, &self.client, key, |c| books::by_genre(c, genre, params)).await;
        self.settle(result)
    }

    pub async fn top_rated_books(
        &mut self,
        params: &BookSearchParams,
    ) -> Result<Page<Book>, ClientError> {
        let key = QueryKey::new(["books", "topRated"]).with_query(&params.to_query());
        let result =
            cached(&mut self.cache, &self.client, key, |c| books::top_rated(c, params)).await;
        self.settle(result)
    }

    // Reviews

    pub async fn reviews(&mut self, filters: &ReviewFilters) -> Result<Page<Review>, ClientError> {
        let key = QueryKey::new(["reviews", "list"]).with_query(&filters.to_query());
        let result = cached(&mut self.cache, &self.client, key, |c| reviews::list(c, filters)).await;
        self.settle(result)
    }

    pub async fn review(&mut self, id: i64) -> Result<Review, ClientError> {
        let key = QueryKey::new(["reviews", "id"]).child(id);
        let result = cached(&mut self.cache, &self.client, key, |c| reviews::get(c, id)).await;
        self.settle(result)
    }

    pub async fn book_reviews(
        &mut self,
        book_id: i64,
        page: &PageParams,
    ) -> Result<Page<Review>, ClientError> {
        let key = QueryKey::new(["reviews", "book"])
            .child(book_id)
            .with_query(&page.to_query());
        let result =
            cached(&mut self.cache, &self.client, key, |c| reviews::for_book(c, book_id, page)).await;
        self.settle(result)
    }

    pub async fn user_reviews(
        &mut self,
        user_id: i64,
        page: &PageParams,
    ) -> Result<Page<Review>, ClientError> {
        let key = QueryKey::new(["reviews", "user"])
            .child(user_id)
            .with_query(&page.to_query());
        let result =
            cached(&mut self.cache, &self.client, key, |c| reviews::for_user(c, user_id, page)).await;
        self.settle(result)
    }

    pub async fn my_reviews(&mut self, page: &PageParams) -> Result<Page<Review>, ClientError> {
        let key = QueryKey::new(["reviews", "currentUser", "list"]).with_query(&page.to_query());
        let result = cached(&mut self.cache, &self.client, key, |c| reviews::mine(c, page)).await;
        self.settle(result)
    }

    pub async fn my_review_for_book(&mut self, book_id: i64) -> Result<Option<Review>, ClientError> {
        let key = QueryKey::new(["reviews", "currentUser", "book"]).child(book_id);
        let result =
            cached(&mut self.cache, &self.client, key, |c| reviews::mine_for_book(c, book_id)).await;
        self.settle(result)
    }

    pub async fn has_reviewed(&mut self, book_id: i64) -> Result<bool, ClientError> {
        let key = QueryKey::new(["reviews", "currentUser", "hasReviewed"]).child(book_id);
        let result =
            cached(&mut self.cache, &self.client, key, |c| reviews::has_reviewed(c, book_id)).await;
        self.settle(result)
    }

    pub async fn review_stats(&mut self, book_id: i64) -> Result<ReviewStats, ClientError> {
        let key = QueryKey::new(["reviews", "book"]).child(book_id).child("stats");
        let result =
            cached(&mut self.cache, &self.client, key, |c| reviews::stats_for_book(c, book_id)).await;
        self.settle(result)
    }

    pub async fn create_review(&mut self, review: &NewReview) -> Result<Review, ClientError> {
        let result = reviews::create(&self.client, review).await;
        self.mutated(result, Mutation::ReviewSaved { book_id: review.book_id })
    }

    pub async fn update_review(
        &mut self,
        id: i64,
        update: &ReviewUpdate,
    ) -> Result<Review, ClientError> {
        let result = reviews::update(&self.client, id, update).await;
        if let Ok(review) = &result {
            self.cache.apply(Mutation::ReviewSaved { book_id: review.book_id });
        }
        self.settle(result)
    }

    pub async fn delete_review(&mut self, id: i64) -> Result<(), ClientError> {
        let book_id = self
            .cache
            .get::<Review>(&QueryKey::new(["reviews", "id"]).child(id))
            .map(|review| review.book_id);
        let result = reviews::delete(&self.client, id).await;
        self.mutated(result, Mutation::ReviewDeleted { book_id })
    }

    // Profile and favorites

    pub async fn profile(&mut self) -> Result<UserProfile, ClientError> {
        let key = QueryKey::new(["user", "profile"]);
        let result = cached(&mut self.cache, &self.client, key, |c| users::profile(c)).await;
        self.settle(result)
    }

    pub async fn update_profile(&mut self, update: &ProfileUpdate) -> Result<UserProfile, ClientError> {
        let result = users::update_profile(&self.client, update).await;
        self.mutated(result, Mutation::ProfileUpdated)
    }

    pub async fn stats(&mut self) -> Result<UserStats, ClientError> {
        let key = QueryKey::new(["user", "stats"]);
        let result = cached(&mut self.cache, &self.client, key, |c| users::stats(c)).await;
        self.settle(result)
    }

    pub async fn favorites(&mut self, page: &PageParams) -> Result<Page<FavoriteBook>, ClientError> {
        let key = QueryKey::new(["user", "favorites"]).with_query(&page.to_query());
        let result = cached(&mut self.cache, &self.client, key, |c| users::favorites(c, page)).await;
        self.settle(result)
    }

    pub async fn is_favorite(&mut self, book_id: i64) -> Result<bool, ClientError> {
        let key = QueryKey::new(["user", "favorite"]).child(book_id);
        let result =
            cached(&mut self.cache, &self.client, key, |c| users::is_favorite(c, book_id)).await;
        self.settle(result)
    }

    pub async fn add_favorite(&mut self, book_id: i64) -> Result<FavoriteToggle, ClientError> {
        let result = users::add_favorite(&self.client, book_id).await;
        self.mutated(result, Mutation::FavoriteChanged { book_id })
    }

    pub async fn remove_favorite(&mut self, book_id: i64) -> Result<FavoriteToggle, ClientError> {
        let result = users::remove_favorite(&self.client, book_id).await;
        self.mutated(result, Mutation::FavoriteChanged { book_id })
    }

    pub async fn toggle_favorite(&mut self, book_id: i64) -> Result<FavoriteToggle, ClientError> {
        let result = users::toggle_favorite(&self.client, book_id).await;
        self.mutated(result, Mutation::FavoriteChanged { book_id })
    }

    // Recommendations

    pub async fn recommendations(
        &mut self,
        strategy: Strategy,
        params: &RecommendationParams,
        refresh: bool,
    ) -> Result<RecommendationSet, ClientError> {
        if refresh {
            self.cache.apply(Mutation::RecommendationsRefreshed);
        }
        let key = QueryKey::new(["recommendations", strategy.as_str()]).with_query(&params.to_query());
        let result = cached(&mut self.cache, &self.client, key, |c| {
            recommendations::for_strategy(c, strategy, params)
        })
        .await;
        self.settle(result)
    }
}

/// Message for an `error` that leaves the user needing to log in
///
/// `had_session` is whether anything was stored before the command ran.
pub fn login_required(app: &App, error: &ClientError, had_session: bool) -> Option<&'static str> {
    if !error.is_unauthorized() || app.auth_state() != AuthState::Failed {
        return None;
    }
    Some(if had_session {
        "Session expired, please run `bookshelf login`"
    } else {
        "Not logged in, please run `bookshelf login`"
    })
}
