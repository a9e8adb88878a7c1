//! Keeps per-agent OAuth/API credentials consistent between a local disk
//! replica and the cloud secret store, with automatic OAuth refresh
//! (`spec.md` §4.6).

pub mod backend;
pub mod refresh;
pub mod shutdown;
pub mod sync;

pub use backend::{ApiKeyBackend, AssistantOauthBackend, CredentialBackend, FileSetBackend};
pub use refresh::{HttpOauthRefresher, OauthRefresher};
pub use shutdown::ShutdownSignal;
pub use sync::{CredentialSynchronizer, CredsIntervals};
