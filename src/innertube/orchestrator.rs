use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{ResolveError, Result};
use crate::innertube::api::PlayerApi;
use crate::innertube::auth::AuthorizationProvider;
use crate::innertube::personas::ClientPersonaRegistry;
use crate::innertube::request::PlayerRequest;
use crate::innertube::response::{AggregatedPlayback, Classified, ResponseClass, classify};

/// What the state machine does with one classified persona outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  /// Fold the response into the aggregate and keep going.
  Accept,
  /// Terminal: stop all further attempts and surface an error.
  Fail,
  /// Replay the current group once with credentials attached.
  RestartWithAuth,
  /// Definitive for this persona; move to the next one.
  NextPersona,
  /// Persona refused to serve this content; group policy decides.
  SkipPersona,
}

/// The full transition table. Total over the input domain so every row is
/// enumerable in tests; the driver loop adds no decisions of its own.
pub fn transition(class: ResponseClass, has_auth: bool, restart_allowed: bool) -> Action {
  use ResponseClass::*;
  match (class, has_auth, restart_allowed) {
    (Ok, _, _) => Action::Accept,
    (LiveOffline, _, _) | (Abort, _, _) => Action::Fail,
    (AuthRequired, false, true) => Action::RestartWithAuth,
    (AuthRequired, _, _) => Action::NextPersona,
    (ReauthRequired, true, true) => Action::RestartWithAuth,
    (ReauthRequired, _, _) => Action::NextPersona,
    (Retry, _, _) | (Unknown, _, _) => Action::NextPersona,
    (Skip, _, _) => Action::SkipPersona,
  }
}

/// Drives persona groups in order, classifying each response and aggregating
/// everything usable. Strictly sequential: later attempts depend on how
/// earlier ones were classified.
pub struct PlayerRequestOrchestrator {
  api: Arc<dyn PlayerApi>,
  auth: Option<Arc<dyn AuthorizationProvider>>,
}

impl PlayerRequestOrchestrator {
  pub fn new(api: Arc<dyn PlayerApi>, auth: Option<Arc<dyn AuthorizationProvider>>) -> Self {
    Self { api, auth }
  }

  pub async fn resolve(
    &self,
    registry: &ClientPersonaRegistry,
    video_id: &str,
    signature_timestamp: Option<u32>,
  ) -> Result<AggregatedPlayback> {
    let mut aggregate = AggregatedPlayback::default();
    let mut auth_block: Option<ResolveError> = None;

    'groups: for group in registry.groups() {
      let mut excluded: HashSet<&'static str> = HashSet::new();
      let mut with_auth = false;
      let mut restarted = false;

      loop {
        let mut restart = false;
        'personas: for persona in &group.personas {
          if excluded.contains(persona.name) {
            continue;
          }

          let authorization = if with_auth && persona.supports_auth {
            match &self.auth {
              Some(auth) => auth.authorization_header().await,
              None => None,
            }
          } else {
            None
          };
          let has_auth = authorization.is_some();

          let request = PlayerRequest {
            video_id: video_id.to_string(),
            visitor_data: aggregate.visitor_data.clone(),
            signature_timestamp,
          };

          let (classified, body) = match self
            .api
            .player(persona, &request, authorization.as_deref())
            .await
          {
            Ok(outcome) => {
              aggregate.capture_visitor_data(&outcome.body);
              (classify(outcome.status, &outcome.body), Some(outcome.body))
            }
            Err(e) => {
              debug!(persona = persona.name, error = %e, "player attempt failed in transport");
              (
                Classified {
                  class: ResponseClass::Retry,
                  reason: None,
                },
                None,
              )
            }
          };
          debug!(
            persona = persona.name,
            group = group.name,
            class = ?classified.class,
            reason = classified.reason.as_deref().unwrap_or(""),
            "persona attempt classified"
          );

          let restart_allowed =
            group.restart_with_auth && self.auth.is_some() && !restarted;
          match transition(classified.class, has_auth, restart_allowed) {
            Action::Accept => {
              if let Some(body) = &body {
                aggregate.absorb(persona, body);
              }
              excluded.insert(persona.name);
            }
            Action::Fail => {
              return Err(terminal_error(classified));
            }
            Action::RestartWithAuth => {
              if classified.class == ResponseClass::ReauthRequired {
                if let Some(auth) = &self.auth {
                  auth.invalidate().await;
                }
              }
              info!(
                group = group.name,
                "replaying persona group with credentials"
              );
              restarted = true;
              restart = true;
              break 'personas;
            }
            Action::NextPersona => {
              if matches!(
                classified.class,
                ResponseClass::AuthRequired | ResponseClass::ReauthRequired
              ) {
                if classified.class == ResponseClass::ReauthRequired && has_auth {
                  if let Some(auth) = &self.auth {
                    auth.invalidate().await;
                  }
                }
                auth_block.get_or_insert_with(|| auth_error(&classified));
              }
              excluded.insert(persona.name);
            }
            Action::SkipPersona => {
              excluded.insert(persona.name);
              if !group.allow_skip {
                debug!(group = group.name, "group does not permit skipping, moving on");
                continue 'groups;
              }
            }
          }
        }

        if restart {
          with_auth = true;
          continue;
        }
        break;
      }

      if aggregate.has_streams() {
        debug!(group = group.name, "group produced streams, stopping persona fan-out");
        break 'groups;
      }
    }

    if aggregate.has_streams() {
      Ok(aggregate)
    } else if let Some(err) = auth_block {
      Err(err)
    } else {
      warn!(video_id, "every persona group exhausted without streams");
      Err(ResolveError::NoStreamsFound)
    }
  }
}

fn terminal_error(classified: Classified) -> ResolveError {
  let reason = classified.reason.unwrap_or_else(|| match classified.class {
    ResponseClass::LiveOffline => "live stream is currently offline".to_string(),
    _ => "playback rejected upstream".to_string(),
  });
  ResolveError::NotAvailable { reason }
}

fn auth_error(classified: &Classified) -> ResolveError {
  let reason = classified
    .reason
    .clone()
    .unwrap_or_else(|| "sign-in required".to_string());
  let lowered = reason.to_lowercase();
  if lowered.contains("age") || lowered.contains("member") || lowered.contains("join this channel")
  {
    ResolveError::AgeOrMembershipGate { reason }
  } else {
    ResolveError::AuthRequired
  }
}
