//! Authentication against the Gmail API.
//!
//! [`authenticate`] produces a valid credential handle, reusing the stored
//! one when possible, refreshing it when expired, and otherwise running the
//! interactive consent flow in the browser. [`Session`] keeps the handle
//! valid for the rest of the run. Nothing else writes the token store.

pub mod flow;
pub mod loopback;
pub mod secrets;
pub mod token;

pub use flow::{OAuthClient, PkceChallenge};
pub use secrets::ClientSecrets;
pub use token::{Token, TokenStore};

use crate::error::Result;

/// Read-only access to the mailbox is all the downloader needs.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Obtain a credential the API will accept and persist it.
///
/// - stored and not expired: reused as is;
/// - expired with a refresh token: refreshed, and a refresh failure is
///   fatal (no fallback to the browser);
/// - otherwise: interactive consent.
pub fn authenticate(store: &TokenStore, client: &OAuthClient, scopes: &[&str]) -> Result<Token> {
    let token = match store.load()? {
        Some(token) if !token.is_expired() => {
            tracing::debug!("Stored credentials are still valid");
            token
        }
        Some(token) if token.can_refresh() => {
            tracing::debug!("Credentials were expired, attempting to refresh");
            client.refresh(&token)?
        }
        _ => {
            tracing::info!("No usable credentials found, asking the user for authorization");
            interactive_authorization(client, scopes)?
        }
    };

    store.save(&token)?;
    tracing::info!("Successfully authenticated to Gmail");
    Ok(token)
}

/// Run the authorization code flow through a loopback redirect.
pub fn interactive_authorization(client: &OAuthClient, scopes: &[&str]) -> Result<Token> {
    let receiver = loopback::LoopbackReceiver::bind()?;
    let redirect_uri = receiver.redirect_uri();
    let pkce = PkceChallenge::generate();
    let state = flow::random_urlsafe(16);

    let url = client.authorization_url(&redirect_uri, scopes, &state, &pkce)?;

    eprintln!("Please visit this URL to authorize this application:\n\n  {url}\n");
    if let Err(e) = opener::open(url.as_str()) {
        tracing::debug!(error = %e, "Could not open a browser");
    }

    let code = receiver.wait_for_code(&state)?;
    client.exchange_code(&code, &redirect_uri, pkce.verifier())
}

/// A credential kept fresh for the duration of a run.
///
/// Before each request the token's expiry is checked; an expired token is
/// refreshed and the result persisted before it is used.
pub struct Session {
    token: Token,
    client: OAuthClient,
    store: TokenStore,
}

impl Session {
    pub fn new(token: Token, client: OAuthClient, store: TokenStore) -> Self {
        Self {
            token,
            client,
            store,
        }
    }

    /// The access token to send, refreshing first if it has expired.
    pub fn access_token(&mut self) -> Result<String> {
        if self.token.is_expired() {
            tracing::info!("Access token expired mid-run, refreshing");
            let refreshed = self.client.refresh(&self.token)?;
            self.store.save(&refreshed)?;
            self.token = refreshed;
        }
        Ok(self.token.access_token.clone())
    }
}
