//! # solid-auth: session-scoped access to Solid Pods
//!
//! Authenticates against a Community Solid Server with the account API and
//! the client-credentials grant, binds the resulting token to a DPoP key and
//! keeps it behind an opaque, expiring session id.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │   solid_login                │
//! │   email + password + issuer  │
//! └──────────────────────────────┘
//!               ↓
//!   ┌──────────────────────────┐
//!   │   CREDENTIAL ACQUIRER    │
//!   │   .account/ → login      │
//!   │   → client credentials   │
//!   │   → .oidc/token (DPoP)   │
//!   └──────────────────────────┘
//!               ↓
//!   ┌──────────────────────────┐
//!   │   SESSION STORE          │
//!   │   sessionId → credential │
//!   │   expires after TTL      │
//!   └──────────────────────────┘
//!               ↓
//!   ┌──────────────────────────┐
//!   │   GATEWAY + POD SERVICE  │
//!   │   read / write / list    │
//!   │   delete / patch / acl   │
//!   └──────────────────────────┘
//! ```

pub mod acquirer;
pub mod config;
pub mod credential;
pub mod dpop;
pub mod error;
pub mod gateway;
pub mod pod;
pub mod session;

// Re-exports for convenience
pub use acquirer::CredentialAcquirer;
pub use config::{normalize_issuer, Identity, SolidConfig};
pub use credential::{AuthenticatedFetch, Credential, DpopFetch, FetchRequest};
pub use dpop::DpopKey;
pub use error::{HandshakeStep, Result, SolidError};
pub use gateway::SessionGateway;
pub use pod::{AccessModes, LoginOutcome, PodService};
pub use session::{SessionId, SessionInfo, SessionStore, MAX_SESSION_TTL};

/// Default session lifetime (1 hour)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Default timeout for each handshake step
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;
