pub mod api;
pub mod auth;
pub mod orchestrator;
pub mod personas;
pub mod request;
pub mod response;

pub use api::{InnerTubeApi, PlayerApi, PlayerCallOutcome};
pub use auth::{AuthBroker, AuthorizationProvider};
pub use orchestrator::{Action, PlayerRequestOrchestrator, transition};
pub use personas::{ClientPersonaRegistry, Persona, PersonaGroup};
pub use request::PlayerRequest;
pub use response::{AggregatedPlayback, ResponseClass, VideoMetadata, classify};
