use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::common::types::AnyResult;

const OAUTH_CLIENT_ID: &str =
  "861556708454-d6dlm3lh05idd8npek18k6be8ba3oc68.apps.googleusercontent.com";
const OAUTH_CLIENT_SECRET: &str = "SboVhoG9s0rNafixCSGGKXAT";
const TOKEN_ENDPOINT: &str = "https://www.youtube.com/o/oauth2/token";

/// Credential capability handed to the orchestrator. Injected as a trait so
/// the retry state machine is testable with a canned provider.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
  /// A ready `Authorization` header value, or `None` when credentials are
  /// unavailable or refreshing failed.
  async fn authorization_header(&self) -> Option<String>;

  /// Drops any cached access token so the next call refreshes.
  async fn invalidate(&self);
}

/// Exchanges configured refresh tokens for short-lived access tokens,
/// rotating through the token list across calls.
pub struct AuthBroker {
  refresh_tokens: Vec<String>,
  current_token_index: RwLock<usize>,
  access_token: RwLock<Option<String>>,
  token_expiry: RwLock<u64>,
  client: reqwest::Client,
}

impl AuthBroker {
  pub fn new(refresh_tokens: Vec<String>, client: reqwest::Client) -> Self {
    Self {
      refresh_tokens,
      current_token_index: RwLock::new(0),
      access_token: RwLock::new(None),
      token_expiry: RwLock::new(0),
      client,
    }
  }

  pub fn has_credentials(&self) -> bool {
    self.refresh_tokens.iter().any(|t| !t.is_empty())
  }

  async fn refresh(&self, refresh_token: &str) -> AnyResult<(String, u64)> {
    let res = self
      .client
      .post(TOKEN_ENDPOINT)
      .json(&json!({
        "client_id": OAUTH_CLIENT_ID,
        "client_secret": OAUTH_CLIENT_SECRET,
        "refresh_token": refresh_token,
        "grant_type": "refresh_token"
      }))
      .send()
      .await?;

    let status = res.status();
    if status == 200 {
      let body: Value = res.json().await?;
      if let Some(access_token) = body.get("access_token").and_then(|t| t.as_str()) {
        let expires_in = body
          .get("expires_in")
          .and_then(|e| e.as_u64())
          .unwrap_or(3600);
        return Ok((access_token.to_string(), expires_in));
      }
    }

    Err(format!("token refresh failed with status: {}", status).into())
  }
}

fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

#[async_trait]
impl AuthorizationProvider for AuthBroker {
  async fn authorization_header(&self) -> Option<String> {
    if !self.has_credentials() {
      return None;
    }
    let now = unix_now();

    {
      let expiry = self.token_expiry.read().await;
      let token = self.access_token.read().await;
      if let Some(t) = token.as_ref() {
        if now < *expiry {
          return Some(format!("Bearer {}", t));
        }
      }
    }

    let idx = {
      let mut current = self.current_token_index.write().await;
      let val = *current;
      *current = (val + 1) % self.refresh_tokens.len();
      val
    };

    let refresh_token = &self.refresh_tokens[idx % self.refresh_tokens.len()];
    if refresh_token.is_empty() {
      return None;
    }

    match self.refresh(refresh_token).await {
      Ok((new_token, expires_in)) => {
        let mut token_store = self.access_token.write().await;
        let mut expiry_store = self.token_expiry.write().await;
        *token_store = Some(new_token.clone());
        *expiry_store = now + expires_in - 30; // 30s buffer
        Some(format!("Bearer {}", new_token))
      }
      Err(e) => {
        tracing::error!("failed to refresh access token for index {}: {}", idx, e);
        None
      }
    }
  }

  async fn invalidate(&self) {
    let mut token_store = self.access_token.write().await;
    let mut expiry_store = self.token_expiry.write().await;
    *token_store = None;
    *expiry_store = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn empty_token_list_yields_no_header() {
    let broker = AuthBroker::new(Vec::new(), reqwest::Client::new());
    assert!(!broker.has_credentials());
    assert_eq!(broker.authorization_header().await, None);
  }

  #[tokio::test]
  async fn cached_token_is_reused_until_expiry() {
    let broker = AuthBroker::new(vec!["rt".to_string()], reqwest::Client::new());
    {
      let mut token = broker.access_token.write().await;
      *token = Some("cached".to_string());
      let mut expiry = broker.token_expiry.write().await;
      *expiry = unix_now() + 600;
    }
    assert_eq!(
      broker.authorization_header().await.as_deref(),
      Some("Bearer cached")
    );
  }

  #[tokio::test]
  async fn invalidate_clears_the_cached_token() {
    let broker = AuthBroker::new(vec!["rt".to_string()], reqwest::Client::new());
    {
      let mut token = broker.access_token.write().await;
      *token = Some("cached".to_string());
      let mut expiry = broker.token_expiry.write().await;
      *expiry = unix_now() + 600;
    }
    broker.invalidate().await;
    assert!(broker.access_token.read().await.is_none());
  }
}
