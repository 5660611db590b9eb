//! Voting-session core: who may do what to which session, and how votes are
//! counted.
//!
//! Each component holds only the repository seams it needs, so a context can
//! be assembled over any store implementing [`shared::store::VotingStore`].

use std::sync::Arc;

use shared::{
    domain::{AuthMode, Session, SessionId, SessionIdStyle, User, UserId},
    error::{ApiError, ErrorCode},
    store::{SessionRepository, UserRepository, VotingStore},
};

pub mod credential;
pub mod directory;
pub mod dispatch;
pub mod gallery;
pub mod ledger;
pub mod presence;
pub mod registry;
pub mod transcode;

pub use directory::UserDirectory;
pub use dispatch::Dispatcher;
pub use gallery::{Gallery, UploadFile};
pub use ledger::VoteLedger;
pub use presence::Presence;
pub use registry::{SessionRegistry, SessionView};
pub use transcode::{NormalizedImage, RasterTranscoder, Transcode};

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingConfig {
    pub auth_mode: AuthMode,
    pub session_id_style: SessionIdStyle,
    pub max_image_bytes: usize,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            auth_mode: AuthMode::Credentialed,
            session_id_style: SessionIdStyle::ShortCode,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

#[derive(Clone)]
pub struct VotingContext {
    pub directory: UserDirectory,
    pub registry: SessionRegistry,
    pub gallery: Gallery,
    pub ledger: VoteLedger,
}

impl VotingContext {
    pub fn new<S>(store: Arc<S>, config: VotingConfig) -> Self
    where
        S: VotingStore + 'static,
    {
        Self::with_transcoder(store, config, Arc::new(RasterTranscoder))
    }

    pub fn with_transcoder<S>(
        store: Arc<S>,
        config: VotingConfig,
        transcoder: Arc<dyn Transcode>,
    ) -> Self
    where
        S: VotingStore + 'static,
    {
        Self {
            directory: UserDirectory::new(store.clone(), config.auth_mode),
            registry: SessionRegistry::new(
                store.clone(),
                store.clone(),
                store.clone(),
                config.session_id_style,
            ),
            gallery: Gallery::new(
                store.clone(),
                store.clone(),
                transcoder,
                config.max_image_bytes,
            ),
            ledger: VoteLedger::new(store.clone(), store.clone(), store.clone(), store),
        }
    }
}

pub(crate) async fn require_user(
    users: &dyn UserRepository,
    user_id: UserId,
) -> Result<User, ApiError> {
    users
        .find_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("user"))
}

pub(crate) async fn require_session(
    sessions: &dyn SessionRepository,
    session_id: &SessionId,
) -> Result<Session, ApiError> {
    sessions
        .load_session(session_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("session"))
}

/// Logs the full error chain; callers only see a generic message.
pub(crate) fn internal(err: anyhow::Error) -> ApiError {
    tracing::error!(error = %format!("{err:#}"), "storage failure");
    ApiError::new(ErrorCode::Internal, "internal storage error")
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
