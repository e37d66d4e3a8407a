use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::errors::{ResolveError, Result};
use crate::innertube::personas::Persona;
use crate::innertube::request::{INNERTUBE_API, PlayerRequest, build_player_body};

/// Raw result of one persona attempt, before classification.
#[derive(Debug)]
pub struct PlayerCallOutcome {
  pub status: u16,
  pub body: Value,
}

/// Transport seam for the player endpoint. The orchestrator only sees this
/// trait, so its state machine runs against canned outcomes in tests.
#[async_trait]
pub trait PlayerApi: Send + Sync {
  async fn player(
    &self,
    persona: &Persona,
    request: &PlayerRequest,
    authorization: Option<&str>,
  ) -> Result<PlayerCallOutcome>;
}

/// Live implementation posting to the player endpoint, with bounded retries
/// and backoff on server errors.
pub struct InnerTubeApi {
  client: reqwest::Client,
  attempts: u32,
}

impl InnerTubeApi {
  pub fn new(client: reqwest::Client, attempts: u32) -> Self {
    Self {
      client,
      attempts: attempts.max(1),
    }
  }
}

#[async_trait]
impl PlayerApi for InnerTubeApi {
  async fn player(
    &self,
    persona: &Persona,
    request: &PlayerRequest,
    authorization: Option<&str>,
  ) -> Result<PlayerCallOutcome> {
    let url = format!("{}/youtubei/v1/player?prettyPrint=false", INNERTUBE_API);
    let body = build_player_body(persona, request);

    let mut last_error: Option<reqwest::Error> = None;
    for attempt in 0..self.attempts {
      if attempt > 0 {
        tokio::time::sleep(Duration::from_millis(250u64 << (attempt - 1).min(4))).await;
      }

      let mut req = self
        .client
        .post(&url)
        .header(reqwest::header::USER_AGENT, persona.user_agent)
        .header("X-YouTube-Client-Name", persona.client_id)
        .header("X-YouTube-Client-Version", persona.client_version);
      if let Some(vd) = request.visitor_data.as_deref() {
        req = req.header("X-Goog-Visitor-Id", vd);
      }
      if let Some(auth) = authorization {
        req = req.header(reqwest::header::AUTHORIZATION, auth);
      }

      let res = match req.json(&body).send().await {
        Ok(res) => res,
        Err(e) => {
          debug!(persona = persona.name, error = %e, "player request transport failure");
          last_error = Some(e);
          continue;
        }
      };
      let status = res.status();
      let text = match res.text().await {
        Ok(text) => text,
        Err(e) => {
          last_error = Some(e);
          continue;
        }
      };

      if status.is_server_error() && attempt + 1 < self.attempts {
        debug!(persona = persona.name, status = %status, "player endpoint server error, retrying");
        continue;
      }

      let body: Value = serde_json::from_str(&text).unwrap_or_default();
      return Ok(PlayerCallOutcome {
        status: status.as_u16(),
        body,
      });
    }

    match last_error {
      Some(e) => Err(ResolveError::Http(e)),
      None => Err(ResolveError::TransientServerError),
    }
  }
}
