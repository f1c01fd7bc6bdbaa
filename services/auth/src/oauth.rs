//! OAuth2 integration for the Google identity provider
//!
//! The session manager only sees the [`IdentityProvider`] trait. The Google
//! implementation runs the authorization-code flow with PKCE; the consent
//! window itself is behind [`ConsentHandler`] so a browser popup, a desktop
//! shell or a terminal prompt can all drive it.

use async_trait::async_trait;
use common::{AppError, IdentityError, KeyValueStore};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AccessToken, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    PkceCodeChallenge, RedirectUrl, RefreshToken, RevocationUrl, Scope, StandardRevocableToken,
    TokenResponse, TokenUrl,
};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Scopes requested for the spreadsheet editor
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/spreadsheets",
];

/// Lifetime assumed when the provider omits `expires_in`
const DEFAULT_LIFETIME_SECS: u64 = 3600;

/// How a token request may interact with the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Show the consent window
    Consent,
    /// Fail instead of prompting
    Silent,
}

/// Token handed out by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

/// Token-issuing side of the identity SDK
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Request an access token, with or without a visible prompt
    async fn request_access_token(&self, prompt: Prompt) -> Result<TokenGrant, IdentityError>;

    /// Revoke an access token with the provider
    async fn revoke(&self, access_token: &str) -> Result<(), IdentityError>;
}

/// Result of the consent window: the redirect's `code` and `state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentResponse {
    pub code: String,
    pub state: String,
}

impl ConsentResponse {
    /// Parse the URL the provider redirected to after consent.
    ///
    /// An `error=access_denied` redirect means the user declined.
    pub fn from_redirect_url(redirect: &str) -> Result<Self, IdentityError> {
        let url = Url::parse(redirect.trim())
            .map_err(|e| IdentityError::Provider(format!("invalid redirect URL: {e}")))?;

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" if value == "access_denied" => return Err(IdentityError::Cancelled),
                "error" => return Err(IdentityError::Provider(value.into_owned())),
                _ => {}
            }
        }

        match (code, state) {
            (Some(code), Some(state)) => Ok(Self { code, state }),
            _ => Err(IdentityError::Provider(
                "redirect is missing code or state".to_string(),
            )),
        }
    }
}

/// The consent window
#[async_trait]
pub trait ConsentHandler: Send + Sync {
    /// Show `authorization_url` to the user and wait for the redirect
    async fn authorize(&self, authorization_url: &str) -> Result<ConsentResponse, IdentityError>;
}

/// OAuth2 configuration for the Google provider
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub revocation_url: String,
    pub scopes: Vec<String>,
}

impl GoogleOAuthConfig {
    /// Configuration with Google's public endpoints and the editor scopes
    pub fn new(client_id: impl Into<String>, redirect_url: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_url: redirect_url.into(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            revocation_url: "https://oauth2.googleapis.com/revoke".to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_client_secret(mut self, secret: Option<String>) -> Self {
        self.client_secret = secret;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

/// Google token client
///
/// Interactive requests go through the consent handler and keep the
/// refresh token under its own storage key; silent requests redeem that
/// refresh token and never prompt.
pub struct GoogleTokenClient {
    client: BasicClient,
    scopes: Vec<String>,
    consent: Arc<dyn ConsentHandler>,
    store: Arc<dyn KeyValueStore>,
    refresh_key: String,
}

impl GoogleTokenClient {
    /// Create a new token client
    pub fn new(
        config: GoogleOAuthConfig,
        consent: Arc<dyn ConsentHandler>,
        store: Arc<dyn KeyValueStore>,
        refresh_key: impl Into<String>,
    ) -> Result<Self, AppError> {
        let sdk_error = |reason: String| AppError::SdkLoad {
            sdk: "identity client".to_string(),
            reason,
        };

        if config.client_id.is_empty() {
            return Err(sdk_error("client id is not configured".to_string()));
        }

        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            config.client_secret.clone().map(ClientSecret::new),
            AuthUrl::new(config.auth_url.clone()).map_err(|e| sdk_error(e.to_string()))?,
            Some(TokenUrl::new(config.token_url.clone()).map_err(|e| sdk_error(e.to_string()))?),
        )
        .set_redirect_uri(
            RedirectUrl::new(config.redirect_url.clone()).map_err(|e| sdk_error(e.to_string()))?,
        )
        .set_revocation_uri(
            RevocationUrl::new(config.revocation_url.clone())
                .map_err(|e| sdk_error(e.to_string()))?,
        );

        Ok(Self {
            client,
            scopes: config.scopes,
            consent,
            store,
            refresh_key: refresh_key.into(),
        })
    }

    /// Build the consent URL with a fresh PKCE challenge
    fn authorization_url(&self) -> (Url, CsrfToken, oauth2::PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("prompt", "consent")
            .add_extra_param("access_type", "offline");

        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let (url, csrf_token) = request.url();
        (url, csrf_token, pkce_verifier)
    }

    async fn request_interactive(&self) -> Result<TokenGrant, IdentityError> {
        let (url, csrf_token, pkce_verifier) = self.authorization_url();
        info!("Requesting interactive consent");

        let response = self.consent.authorize(url.as_str()).await?;
        if response.state != *csrf_token.secret() {
            return Err(IdentityError::Provider("state mismatch".to_string()));
        }

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(response.code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?;

        if let Some(refresh_token) = token.refresh_token() {
            if let Err(e) = self
                .store
                .set(&self.refresh_key, refresh_token.secret())
                .await
            {
                warn!("Failed to persist refresh token: {}", e);
            }
        }

        Ok(grant_from(&token))
    }

    async fn request_silent(&self) -> Result<TokenGrant, IdentityError> {
        let refresh_token = self
            .store
            .get(&self.refresh_key)
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?
            .ok_or(IdentityError::InteractionRequired)?;

        let token = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                warn!("Refresh token rejected: {}", e);
                IdentityError::InteractionRequired
            })?;

        Ok(grant_from(&token))
    }
}

fn grant_from(token: &BasicTokenResponse) -> TokenGrant {
    TokenGrant {
        access_token: token.access_token().secret().clone(),
        expires_in: token
            .expires_in()
            .map(|d| d.as_secs())
            .unwrap_or(DEFAULT_LIFETIME_SECS),
    }
}

#[async_trait]
impl IdentityProvider for GoogleTokenClient {
    async fn request_access_token(&self, prompt: Prompt) -> Result<TokenGrant, IdentityError> {
        match prompt {
            Prompt::Consent => self.request_interactive().await,
            Prompt::Silent => self.request_silent().await,
        }
    }

    async fn revoke(&self, access_token: &str) -> Result<(), IdentityError> {
        let token = StandardRevocableToken::AccessToken(AccessToken::new(access_token.to_string()));
        self.client
            .revoke_token(token)
            .map_err(|e| IdentityError::Provider(e.to_string()))?
            .request_async(async_http_client)
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?;

        // A revoked grant also invalidates the refresh token
        if let Err(e) = self.store.delete(&self.refresh_key).await {
            warn!("Failed to delete refresh token: {}", e);
        }
        Ok(())
    }
}
