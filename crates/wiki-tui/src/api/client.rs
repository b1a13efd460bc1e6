use std::collections::BTreeMap;

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::{Client, StatusCode};
use wiki_shared::api::{
    CreateCategoryRequest, CreatePageRequest, LoginRequest, LoginResponse, MessageResponse,
    ReorderStructureRequest, StructureItem, UpdateCategoryRequest, UpdatePageRequest,
    UpdateSettingsRequest,
};
use wiki_shared::{Category, CategoryTree, MaintenanceStatus, Page, PageWithRelations, Tag, User};

use super::auth::AuthToken;

/// JWT payload claims we need for expiry checking
#[derive(serde::Deserialize)]
struct JwtClaims {
    exp: i64,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Access forbidden")]
    Forbidden,
    #[error("Resource not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Human-readable message of an error response body.
fn error_message(text: &str) -> String {
    serde_json::from_str::<ErrorBody>(text)
        .map(|body| body.message)
        .unwrap_or_else(|_| text.to_string())
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<AuthToken>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Load token from disk
    pub fn load_token(&mut self) -> Result<bool> {
        self.token = AuthToken::load()?;
        if let Some(token) = &self.token {
            tracing::debug!("Loaded stored token for user {}", token.user_id);
        }
        Ok(self.token.is_some())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Decode JWT payload and extract expiration time
    fn decode_token_exp(token: &str) -> Option<i64> {
        // JWT format: header.payload.signature
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
        let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;

        Some(claims.exp)
    }

    /// There is no refresh endpoint; an expired token means logging in again.
    fn bearer(&mut self) -> Result<String, ApiError> {
        let Some(token) = &self.token else {
            return Err(ApiError::Unauthorized);
        };

        if let Some(exp) = Self::decode_token_exp(&token.token) {
            if exp <= chrono::Utc::now().timestamp() {
                tracing::info!("Stored token expired");
                self.token = None;
                AuthToken::delete().map_err(ApiError::Other)?;
                return Err(ApiError::Unauthorized);
            }
        }

        Ok(format!("Bearer {}", token.token))
    }

    // ============ Authenticated Request Helpers ============

    async fn authed_get(&mut self, path: &str) -> Result<reqwest::Response, ApiError> {
        let bearer = self.bearer()?;
        self.client
            .get(self.url(path))
            .header("Authorization", bearer)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn authed_post<T: serde::Serialize>(
        &mut self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ApiError> {
        let bearer = self.bearer()?;
        self.client
            .post(self.url(path))
            .header("Authorization", bearer)
            .json(body)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn authed_put<T: serde::Serialize>(
        &mut self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ApiError> {
        let bearer = self.bearer()?;
        self.client
            .put(self.url(path))
            .header("Authorization", bearer)
            .json(body)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn authed_delete(&mut self, path: &str) -> Result<reqwest::Response, ApiError> {
        let bearer = self.bearer()?;
        self.client
            .delete(self.url(path))
            .header("Authorization", bearer)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::CREATED => {
                response.json().await.map_err(ApiError::Network)
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let text = response.text().await.unwrap_or_default();
                Err(ApiError::Validation(error_message(&text)))
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(ApiError::Server(format!("{}: {}", status, error_message(&text))))
            }
        }
    }

    // ============ Auth ============

    pub async fn login(&mut self, username: &str, password: &str) -> Result<User, ApiError> {
        let req = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let response = self
            .client
            .post(self.url("/login"))
            .json(&req)
            .send()
            .await?;

        let login: LoginResponse = self.handle_response(response).await?;

        let token = AuthToken {
            token: login.token,
            user_id: login.user.id,
        };
        token.save().map_err(ApiError::Other)?;
        self.token = Some(token);

        tracing::info!("Logged in as {}", login.user.username);
        Ok(login.user)
    }

    /// Forget the local token; the server call is best effort.
    pub async fn logout(&mut self) -> Result<(), ApiError> {
        if self.token.is_some() {
            if let Ok(response) = self.authed_post("/logout", &serde_json::json!({})).await {
                let _: Result<MessageResponse, _> = self.handle_response(response).await;
            }
        }

        self.token = None;
        AuthToken::delete().map_err(ApiError::Other)?;
        Ok(())
    }

    pub async fn me(&mut self) -> Result<User, ApiError> {
        let response = self.authed_get("/user").await?;
        self.handle_response(response).await
    }

    /// Public; works before login.
    pub async fn maintenance(&self) -> Result<MaintenanceStatus, ApiError> {
        let response = self.client.get(self.url("/maintenance")).send().await?;
        self.handle_response(response).await
    }

    // ============ Structure ============

    pub async fn categories(&mut self) -> Result<Vec<CategoryTree>, ApiError> {
        let response = self.authed_get("/categories").await?;
        self.handle_response(response).await
    }

    pub async fn pages(&mut self) -> Result<Vec<PageWithRelations>, ApiError> {
        let response = self.authed_get("/pages").await?;
        self.handle_response(response).await
    }

    pub async fn reorder_structure(
        &mut self,
        items: Vec<StructureItem>,
    ) -> Result<MessageResponse, ApiError> {
        let req = ReorderStructureRequest { items };
        let response = self.authed_post("/structure/reorder", &req).await?;
        self.handle_response(response).await
    }

    pub async fn create_category(&mut self, req: &CreateCategoryRequest) -> Result<Category, ApiError> {
        let response = self.authed_post("/categories", req).await?;
        self.handle_response(response).await
    }

    pub async fn update_category(
        &mut self,
        id: i64,
        req: &UpdateCategoryRequest,
    ) -> Result<Category, ApiError> {
        let response = self.authed_put(&format!("/categories/{id}"), req).await?;
        self.handle_response(response).await
    }

    pub async fn delete_category(&mut self, id: i64) -> Result<MessageResponse, ApiError> {
        let response = self.authed_delete(&format!("/categories/{id}")).await?;
        self.handle_response(response).await
    }

    // ============ Pages ============

    pub async fn page(&mut self, slug: &str) -> Result<PageWithRelations, ApiError> {
        let path = format!("/pages/{}", urlencoding::encode(slug));
        let response = self.authed_get(&path).await?;
        self.handle_response(response).await
    }

    pub async fn create_page(&mut self, req: &CreatePageRequest) -> Result<Page, ApiError> {
        let response = self.authed_post("/pages", req).await?;
        self.handle_response(response).await
    }

    pub async fn update_page(&mut self, id: i64, req: &UpdatePageRequest) -> Result<Page, ApiError> {
        let response = self.authed_put(&format!("/pages/{id}"), req).await?;
        self.handle_response(response).await
    }

    pub async fn delete_page(&mut self, id: i64) -> Result<MessageResponse, ApiError> {
        let response = self.authed_delete(&format!("/pages/{id}")).await?;
        self.handle_response(response).await
    }

    // ============ Tags ============

    pub async fn tags(&mut self) -> Result<Vec<Tag>, ApiError> {
        let response = self.authed_get("/tags").await?;
        self.handle_response(response).await
    }

    // ============ Settings ============

    pub async fn settings(&mut self) -> Result<BTreeMap<String, Option<String>>, ApiError> {
        let response = self.authed_get("/admin/settings").await?;
        self.handle_response(response).await
    }

    pub async fn update_settings(
        &mut self,
        req: &UpdateSettingsRequest,
    ) -> Result<MessageResponse, ApiError> {
        let response = self.authed_post("/admin/settings", req).await?;
        self.handle_response(response).await
    }
}
