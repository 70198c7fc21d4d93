//! OAuth2 authorization code flow with PKCE, and token refresh.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use url::Url;

use super::secrets::ClientSecrets;
use super::token::{ErrorResponse, Token, TokenResponse};
use crate::error::{AttachError, Result};

/// PKCE (RFC 7636) code verifier and S256 challenge.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Generates a random 43-character verifier and its SHA256 challenge.
    pub fn generate() -> Self {
        let verifier = random_urlsafe(32);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        let hash = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn method(&self) -> &'static str {
        "S256"
    }
}

/// Random URL-safe string built from `n_bytes` random bytes.
pub fn random_urlsafe(n_bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..n_bytes).map(|_| rng.gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Blocking client for the OAuth2 endpoints named in the client secrets.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    secrets: ClientSecrets,
    http_client: Client,
}

impl OAuthClient {
    pub fn new(secrets: ClientSecrets) -> Result<Self> {
        let http_client = Client::builder().build()?;
        Ok(Self {
            secrets,
            http_client,
        })
    }

    /// Builds the consent page URL the user must visit.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &[&str],
        state: &str,
        pkce: &PkceChallenge,
    ) -> Result<Url> {
        let mut url = Url::parse(&self.secrets.auth_uri).map_err(|e| {
            AttachError::InvalidConfig(format!(
                "invalid auth_uri '{}': {e}",
                self.secrets.auth_uri
            ))
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", pkce.method())
            // Ask for a refresh token so later runs need no browser.
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url)
    }

    /// Exchanges an authorization code for a token.
    ///
    /// Any failure here means the grant did not complete.
    pub fn exchange_code(&self, code: &str, redirect_uri: &str, verifier: &str) -> Result<Token> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", self.secrets.client_id.as_str());
        params.insert("redirect_uri", redirect_uri);
        params.insert("code_verifier", verifier);
        if let Some(secret) = &self.secrets.client_secret {
            params.insert("client_secret", secret.as_str());
        }

        self.token_request(&params)
            .map_err(|e| AttachError::AuthGrant(format!("code exchange failed: {e}")))
    }

    /// Obtains a fresh token using the refresh token of `token`.
    ///
    /// Returns a new handle; `token` itself is left untouched. If the server
    /// does not rotate the refresh token, the old one is carried over.
    pub fn refresh(&self, token: &Token) -> Result<Token> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AttachError::AuthRefresh("no refresh token available".into()))?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", self.secrets.client_id.as_str());
        if let Some(secret) = &self.secrets.client_secret {
            params.insert("client_secret", secret.as_str());
        }

        let mut new_token = self
            .token_request(&params)
            .map_err(|e| AttachError::AuthRefresh(e.to_string()))?;

        if new_token.refresh_token.is_none() {
            new_token.refresh_token.clone_from(&token.refresh_token);
        }
        Ok(new_token)
    }

    fn token_request(&self, params: &HashMap<&str, &str>) -> Result<Token> {
        let response = self
            .http_client
            .post(&self.secrets.token_uri)
            .form(params)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.to_string())
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(AttachError::remote(status.as_u16(), message));
        }

        let token_response: TokenResponse = response.json()?;
        Ok(Token::from_response(token_response))
    }
}
