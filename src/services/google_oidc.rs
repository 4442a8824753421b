// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Sign-In: ID token verification and the identity provider built
//! on it.

use crate::error::AppError;
use crate::services::identity::{AuthFailure, Identity, IdentityProvider, SignInRequest};
use anyhow::Context;
use futures_util::future::{self, BoxFuture};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Mutex, RwLock};

const JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Token verification error categories.
#[derive(Debug, Clone)]
pub enum OidcError {
    /// The token is malformed, expired, or issued for someone else.
    Forbidden(String),
    /// Keys could not be fetched; retrying may succeed.
    Transient(String),
}

impl From<OidcError> for AuthFailure {
    fn from(err: OidcError) -> Self {
        match err {
            OidcError::Transient(msg) => AuthFailure::Network(msg),
            OidcError::Forbidden(msg) => AuthFailure::Other(msg),
        }
    }
}

#[derive(Clone)]
enum KeySource {
    Google,
    StaticKey {
        kid: String,
        decoding_key: Arc<DecodingKey>,
    },
}

struct KeyCache {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Google-issued ID tokens addressed to this app's client ID.
pub struct GoogleIdTokenVerifier {
    http_client: reqwest::Client,
    client_id: String,
    keys: KeySource,
    cache: RwLock<Option<KeyCache>>,
    refresh_lock: Mutex<()>,
}

impl GoogleIdTokenVerifier {
    /// Create a verifier that fetches and caches Google's signing keys.
    pub fn new(client_id: impl Into<String>) -> anyhow::Result<Self> {
        Self::build(client_id.into(), KeySource::Google)
    }

    /// Create a verifier that trusts a single RSA public key.
    ///
    /// Used by tests that sign their own tokens.
    pub fn new_with_static_key(
        client_id: impl Into<String>,
        kid: impl Into<String>,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static key id must not be empty");
        }
        Self::build(
            client_id.into(),
            KeySource::StaticKey {
                kid,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn build(client_id: String, keys: KeySource) -> anyhow::Result<Self> {
        if client_id.trim().is_empty() {
            anyhow::bail!("Google client ID must not be empty");
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building token verifier HTTP client")?;

        tracing::info!(client_id = %client_id, "Initialized Google ID token verifier");

        Ok(Self {
            http_client,
            client_id,
            keys,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify an ID token and return the identity it names.
    pub async fn verify(&self, token: &str) -> Result<Identity, OidcError> {
        if token.trim().is_empty() {
            return Err(OidcError::Forbidden("ID token is empty".to_string()));
        }

        let header = decode_header(token)
            .map_err(|e| OidcError::Forbidden(format!("invalid JWT header: {e}")))?;

        if header.alg != Algorithm::RS256 {
            return Err(OidcError::Forbidden(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| OidcError::Forbidden("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&["https://accounts.google.com", "accounts.google.com"]);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<IdTokenClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| OidcError::Forbidden(format!("JWT validation failed: {e}")))?
            .claims;

        validate_iat(claims.iat)?;

        if claims.sub.trim().is_empty() {
            return Err(OidcError::Forbidden("empty sub claim".to_string()));
        }

        // An unverified address is still usable as a display label, but
        // never as the account key; `sub` is.
        let email = claims.email.filter(|_| claims.email_verified != Some(false));

        tracing::debug!(subject = %claims.sub, has_email = email.is_some(), "ID token verified");

        Ok(Identity {
            uid: claims.sub,
            email,
            display_name: claims.name,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        if let KeySource::StaticKey {
            kid: static_kid,
            decoding_key,
        } = &self.keys
        {
            return if kid == static_kid {
                Ok(decoding_key.clone())
            } else {
                Err(OidcError::Forbidden(format!("unknown JWT kid: {kid}")))
            };
        }

        if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        }

        // Google rotates keys; a new kid may appear before our TTL expires.
        for force_refresh in [false, true] {
            self.refresh_keys(force_refresh).await?;
            if let Some(key) = self.cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(OidcError::Forbidden(format!(
            "JWT kid not found after refresh: {kid}"
        )))
    }

    async fn cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let now = Instant::now();
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|c| c.expires_at > now)
            .and_then(|c| c.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_keys(&self, force_refresh: bool) -> Result<(), OidcError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh
            && self
                .cache
                .read()
                .await
                .as_ref()
                .is_some_and(|c| c.expires_at > Instant::now())
        {
            return Ok(());
        }

        tracing::debug!(url = JWKS_URL, "Refreshing Google signing keys");

        let response = self
            .http_client
            .get(JWKS_URL)
            .send()
            .await
            .map_err(|e| OidcError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_cache_control_max_age)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| OidcError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_keys(jwks);
        if keys_by_kid.is_empty() {
            return Err(OidcError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.cache.write().await = Some(KeyCache {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "Google signing keys refreshed");
        Ok(())
    }
}

/// Identity provider backed by Google Sign-In.
///
/// The browser runs the sign-in widget and hands the resulting ID token (or
/// the provider error code) to the server; this type verifies the token and
/// publishes session changes.
pub struct GoogleIdentityProvider {
    verifier: GoogleIdTokenVerifier,
    session: watch::Sender<Option<Identity>>,
}

impl GoogleIdentityProvider {
    pub fn new(verifier: GoogleIdTokenVerifier) -> Self {
        let (session, _) = watch::channel(None);
        Self { verifier, session }
    }

    async fn verify_request(&self, request: SignInRequest) -> Result<Identity, AuthFailure> {
        if let Some(code) = request.error.filter(|c| !c.is_empty()) {
            return Err(AuthFailure::from_code(&code));
        }

        let token = request
            .id_token
            .ok_or_else(|| AuthFailure::Other("missing ID token".to_string()))?;

        let identity = self.verifier.verify(&token).await.inspect_err(|e| {
            tracing::warn!(error = ?e, "ID token rejected");
        })?;

        self.session.send_replace(Some(identity.clone()));
        Ok(identity)
    }
}

impl IdentityProvider for GoogleIdentityProvider {
    fn sign_in(&self, request: SignInRequest) -> BoxFuture<'_, Result<Identity, AuthFailure>> {
        Box::pin(self.verify_request(request))
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AppError>> {
        self.session.send_replace(None);
        Box::pin(future::ready(Ok(())))
    }

    fn on_auth_state_changed(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    iat: Option<u64>,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
}

fn usable_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|u| u != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA key");
            }
        }
    }

    keys_by_kid
}

fn validate_iat(iat: Option<u64>) -> Result<(), OidcError> {
    let Some(iat) = iat else {
        return Err(OidcError::Forbidden("missing iat claim".to_string()));
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    if iat > now + CLOCK_SKEW_SECS {
        return Err(OidcError::Forbidden("iat claim is in the future".to_string()));
    }

    Ok(())
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|raw| raw.trim_matches('"').parse::<u64>().ok())
}
