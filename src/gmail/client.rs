//! Blocking HTTPS client for the Gmail API.

use std::cell::RefCell;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;

use super::{remote_error, AttachmentBody, GmailMessage, MailboxApi, MessageList};
use crate::auth::Session;
use crate::error::Result;

/// Public Gmail API endpoint.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// The authenticated user, as Gmail spells it.
pub const ME: &str = "me";

pub struct GmailClient {
    http: Client,
    base_url: String,
    user_id: String,
    session: RefCell<Session>,
}

impl GmailClient {
    pub fn new(session: Session) -> Result<Self> {
        Self::with_base_url(session, GMAIL_API_BASE)
    }

    /// Use an alternative API root (e.g. a local proxy).
    pub fn with_base_url(session: Session, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: ME.to_string(),
            session: RefCell::new(session),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.base_url, self.user_id)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T> {
        let token = self.session.borrow_mut().access_token()?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(params)
            .send()?;
        let response = check_status(response)?;
        Ok(response.json()?)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let err = remote_error(status.as_u16(), &body);
    tracing::debug!(status = %status, error = %err, "Gmail API call failed");
    Err(err)
}

impl MailboxApi for GmailClient {
    fn list_messages(&self, page_token: Option<&str>, query: Option<&str>) -> Result<MessageList> {
        tracing::debug!(page_token = ?page_token, "Retrieving page of messages");
        let mut params = Vec::new();
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            params.push(("q", q));
        }
        self.get_json(&self.messages_url(), &params)
    }

    fn get_message(&self, id: &str) -> Result<GmailMessage> {
        let url = format!("{}/{}", self.messages_url(), id);
        self.get_json(&url, &[("format", "full")])
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<AttachmentBody> {
        let url = format!(
            "{}/{}/attachments/{}",
            self.messages_url(),
            message_id,
            attachment_id
        );
        self.get_json(&url, &[])
    }
}
