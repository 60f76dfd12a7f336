use serde_json::json;

use super::{ApiClient, ApiRequest, ClientError};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User};
use crate::session::Session;

/// Log in and persist the returned session
pub async fn login(client: &ApiClient, credentials: &LoginRequest) -> Result<User, ClientError> {
    let request = ApiRequest::post("/auth/login").json(credentials)?;
    let response: AuthResponse = client.fetch(request).await?;
    store_session(client, &response)?;

    tracing::info!("Logged in as {}", response.user.email);
    Ok(response.user)
}

/// Create an account; the form is validated before anything is sent
pub async fn register(client: &ApiClient, form: &RegisterRequest) -> Result<User, ClientError> {
    form.validate().map_err(ClientError::Validation)?;

    let request = ApiRequest::post("/auth/register").json(&form.payload())?;
    let response: AuthResponse = client.fetch(request).await?;
    store_session(client, &response)?;

    tracing::info!("Registered {}", response.user.email);
    Ok(response.user)
}

fn store_session(client: &ApiClient, response: &AuthResponse) -> Result<(), ClientError> {
    client.session().save(&Session::from_auth(response))?;
    client.reset_auth_state();

    if let Some(seconds) = response.expires_in {
        tracing::debug!(
            "{} token valid for {}s",
            response.token_type.as_deref().unwrap_or("Bearer"),
            seconds
        );
    }
    Ok(())
}

/// Tell the backend we're leaving, then drop the local session regardless
pub async fn logout(client: &ApiClient) -> Result<(), ClientError> {
    if client.session().access_token().is_some() {
        if let Err(e) = client.execute(ApiRequest::post("/auth/logout")).await {
            tracing::warn!("Logout request failed: {}", e);
        }
    }

    client.session().clear()?;
    Ok(())
}

pub async fn forgot_password(client: &ApiClient, email: &str) -> Result<(), ClientError> {
    let request = ApiRequest::post("/auth/forgot-password").json(&json!({ "email": email }))?;
    client.execute(request).await?;
    Ok(())
}

pub async fn reset_password(
    client: &ApiClient,
    token: &str,
    new_password: &str,
) -> Result<(), ClientError> {
    let request = ApiRequest::post("/auth/reset-password")
        .json(&json!({ "token": token, "newPassword": new_password }))?;
    client.execute(request).await?;
    Ok(())
}
