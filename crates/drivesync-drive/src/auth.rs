//! OAuth2 PKCE authentication flow for Google Drive
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) for a native
//! desktop client, using a loopback redirect to receive the code.
//!
//! ## Components
//!
//! - [`OAuth2Config`] - Client id, secret, loopback port and scopes
//! - [`TokenStore`] - Token persistence in `credentials.json`
//! - [`PkceFlow`] - OAuth2 PKCE challenge/exchange/refresh logic
//! - [`LocalCallbackServer`] - Loopback listener receiving the redirect
//! - [`DriveAuthAdapter`] - Orchestrates the full interactive login
//! - [`OAuthRefresher`] - [`TokenRefresher`] used by the client on expiry

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth2::{
    basic::{BasicClient, BasicTokenResponse},
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse,
    TokenUrl,
};
use tracing::{debug, info, warn};

use drivesync_core::config::AuthConfig;
use drivesync_core::ports::Tokens;

/// Google OAuth2 authorization endpoint
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth2 token endpoint
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Full read/write access to the user's drive
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Path the loopback server answers on
const CALLBACK_PATH: &str = "/callback";

// ============================================================================
// OAuth2Config
// ============================================================================

/// Installed-application OAuth client settings
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// OAuth client id of the desktop application
    pub client_id: String,
    /// Client secret; Google issues one even for installed applications
    pub client_secret: Option<String>,
    /// Loopback port for the redirect
    pub redirect_port: u16,
    /// Requested scopes, full drive access by default
    pub scopes: Vec<String>,
}

impl OAuth2Config {
    /// Creates a new OAuth2Config with the given client id and default settings
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_port: AuthConfig::default().redirect_port,
            scopes: vec![DRIVE_SCOPE.to_string()],
        }
    }

    /// Builds the OAuth settings from the `auth` configuration section
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let Some(client_id) = config.client_id.as_deref() else {
            bail!("auth.client_id is not configured; set it in config.yaml");
        };
        Ok(Self {
            client_secret: config.client_secret.clone(),
            redirect_port: config.redirect_port,
            ..Self::new(client_id)
        })
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.redirect_port, CALLBACK_PATH)
    }
}

// ============================================================================
// TokenStore
// ============================================================================

/// Stores OAuth tokens as JSON in a file readable only by the owner
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored tokens, `None` when nothing was stored yet
    pub fn load(&self) -> Result<Option<Tokens>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No stored credentials");
            return Ok(None);
        }
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let tokens: Tokens = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse credentials in {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Loaded stored credentials");
        Ok(Some(tokens))
    }

    /// Stores the tokens, replacing earlier ones
    pub fn store(&self, tokens: &Tokens) -> Result<()> {
        let json = serde_json::to_string_pretty(tokens).context("Failed to serialize tokens")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Stored credentials");
        Ok(())
    }

    /// Removes the stored tokens
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Cleared stored credentials");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to remove credentials")),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions of {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

// ============================================================================
// PkceFlow
// ============================================================================

/// Google's authorization-code grant with a PKCE challenge, plus refresh
pub struct PkceFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl PkceFlow {
    pub fn new(config: &OAuth2Config) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri()).context("Invalid redirect URI")?,
            );
        if let Some(secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        // token endpoint responses must not be followed across redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build OAuth HTTP client")?;

        Ok(Self {
            client,
            scopes: config.scopes.clone(),
            http,
        })
    }

    /// Consent URL plus the CSRF state and the verifier the code exchange needs
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self.client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        // offline access yields a refresh token; consent forces it on re-login
        let (auth_url, csrf_token) = auth_request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        debug!(scopes = self.scopes.len(), "Built consent URL");
        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Trade the code from the redirect for tokens
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<Tokens> {
        debug!("Redeeming authorization code");

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("Google rejected the authorization code")?;

        let tokens = tokens_from_response(&token_result, None);
        info!(expires_at = %tokens.expires_at, "Obtained drive tokens");
        Ok(tokens)
    }

    /// New access token for a stored refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        debug!("Refreshing drive access token");

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .context("Google rejected the refresh token")?;

        // Google omits the refresh token on refresh; keep the old one
        let tokens = tokens_from_response(&token_result, Some(refresh_token));
        info!(expires_at = %tokens.expires_at, "Refreshed drive access token");
        Ok(tokens)
    }
}

fn tokens_from_response(response: &BasicTokenResponse, previous_refresh: Option<&str>) -> Tokens {
    let expires_at = response
        .expires_in()
        .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Utc::now() + Duration::hours(1));

    Tokens {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response
            .refresh_token()
            .map(|t| t.secret().to_string())
            .or_else(|| previous_refresh.map(str::to_string)),
        expires_at,
    }
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// Minimal HTTP server that listens on localhost for the OAuth2 redirect.
///
/// Binds `127.0.0.1:<port>` and serves connections until one carries an
/// authorization code, answers it with a success page and shuts down.
pub struct LocalCallbackServer {
    port: u16,
}

/// Parameters extracted from the OAuth2 callback
#[derive(Debug)]
pub struct CallbackParams {
    /// The authorization code
    pub code: String,
    /// The CSRF state parameter
    pub state: String,
}

impl LocalCallbackServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Serve the loopback port until a request carries an authorization code
    pub async fn wait_for_code(&self) -> Result<CallbackParams> {
        use std::sync::Arc;

        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::net::TcpListener;
        use tokio::sync::{mpsc, Mutex};

        let addr = format!("127.0.0.1:{}", self.port);
        debug!(%addr, "Listening for the OAuth redirect");
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Cannot listen on {addr}; is auth.redirect_port in use?"))?;

        let (tx, mut rx) = mpsc::channel::<CallbackParams>(1);
        let tx = Arc::new(Mutex::new(Some(tx)));

        loop {
            tokio::select! {
                params = rx.recv() => {
                    let params = params
                        .context("Redirect listener stopped before a code arrived")?;
                    debug!("Authorization code received");
                    return Ok(params);
                }
                accepted = listener.accept() => {
                    let (stream, _peer) = accepted
                        .context("Redirect listener failed to accept a connection")?;
                    let io = TokioIo::new(stream);
                    let tx = Arc::clone(&tx);

                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let tx = Arc::clone(&tx);
                        async move {
                            let uri = req.uri().to_string();
                            debug!(%uri, "Redirect request");

                            let (status, html) = match parse_callback_params(&uri) {
                                Some(params) => {
                                    if let Some(sender) = tx.lock().await.take() {
                                        let _ = sender.send(params).await;
                                    }
                                    (
                                        StatusCode::OK,
                                        callback_page("drivesync is authorized", "You can close this tab."),
                                    )
                                }
                                None => (
                                    StatusCode::BAD_REQUEST,
                                    callback_page("Authorization failed", "The redirect carried no authorization code."),
                                ),
                            };
                            let mut response = Response::new(Full::new(Bytes::from(html)));
                            *response.status_mut() = status;
                            response.headers_mut().insert(
                                hyper::header::CONTENT_TYPE,
                                hyper::header::HeaderValue::from_static("text/html; charset=utf-8"),
                            );
                            Ok::<_, hyper::Error>(response)
                        }
                    });

                    tokio::spawn(async move {
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            warn!(error = %e, "Redirect connection failed");
                        }
                    });
                }
            }
        }
    }
}

/// `code` and `state` of a request to the callback path
fn parse_callback_params(uri: &str) -> Option<CallbackParams> {
    let url = url::Url::parse(&format!("http://localhost{uri}")).ok()?;
    if url.path() != CALLBACK_PATH {
        return None;
    }
    let mut code = None;
    let mut state = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            _ => {}
        }
    }

    Some(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

/// Page shown in the browser once the redirect has been handled
fn callback_page(heading: &str, detail: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>drivesync</title></head>\n\
         <body style=\"font-family: sans-serif; margin: 3em;\">\n\
         <h2>{heading}</h2>\n<p>{detail}</p>\n</body></html>"
    )
}

// ============================================================================
// DriveAuthAdapter
// ============================================================================

/// Interactive login: consent in the browser, redirect to the loopback
/// listener, CSRF check, then code exchange
pub struct DriveAuthAdapter {
    config: OAuth2Config,
}

impl DriveAuthAdapter {
    pub fn new(config: OAuth2Config) -> Self {
        Self { config }
    }

    pub async fn login(&self) -> Result<Tokens> {
        debug!(port = self.config.redirect_port, "Starting interactive login");
        let flow = PkceFlow::new(&self.config)?;
        let (auth_url, csrf_token, pkce_verifier) = flow.generate_auth_url();

        let server = LocalCallbackServer::new(self.config.redirect_port);
        info!(url = %auth_url, "Open this URL in a browser to authorize drivesync");
        if let Err(e) = webbrowser::open(&auth_url) {
            warn!(error = %e, "Failed to open browser, continuing with the printed URL");
        }

        let callback = server.wait_for_code().await?;
        if callback.state != *csrf_token.secret() {
            bail!("OAuth callback state does not match the authorization request");
        }

        let tokens = flow.exchange_code(callback.code, pkce_verifier).await?;
        Ok(tokens)
    }

}

// ============================================================================
// Token refresh
// ============================================================================

/// Renews expired tokens on behalf of the HTTP client
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, tokens: &Tokens) -> Result<Tokens>;
}

/// Refreshes through the OAuth token endpoint and persists the result
pub struct OAuthRefresher {
    flow: PkceFlow,
    store: Option<TokenStore>,
}

impl OAuthRefresher {
    pub fn new(config: &OAuth2Config, store: Option<TokenStore>) -> Result<Self> {
        Ok(Self {
            flow: PkceFlow::new(config)?,
            store,
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, tokens: &Tokens) -> Result<Tokens> {
        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            bail!("access token expired and no refresh token is stored; run `drivesync login`");
        };
        let renewed = self.flow.refresh_token(refresh_token).await?;
        if let Some(store) = &self.store {
            store.store(&renewed)?;
        }
        Ok(renewed)
    }
}
