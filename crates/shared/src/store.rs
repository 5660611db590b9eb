//! Repository seams between the voting core and its backing store.
//!
//! Every method reports infrastructure failures through `anyhow`; domain
//! outcomes that callers must branch on (a taken username, an id collision, a
//! duplicate vote) are encoded in the `Ok` value instead.

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    domain::{ImageId, Session, SessionId, StoredImage, User, UserId, VoteId},
    protocol::{ImageSummary, TallyEntry},
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Returns `None` when the username is already taken.
    async fn insert_user(&self, username: &str, credential_hash: Option<&str>)
        -> Result<Option<UserId>>;

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>>;

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// Returns `false` when no such user exists.
    async fn set_credential_hash(&self, user_id: UserId, credential_hash: &str) -> Result<bool>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Returns `false` when `session_id` is already in use.
    async fn insert_session(&self, session_id: &SessionId, name: &str, host_id: UserId)
        -> Result<bool>;

    async fn load_session(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// All sessions, oldest first.
    async fn list_sessions(&self) -> Result<Vec<Session>>;

    async fn list_sessions_hosted_by(&self, host_id: UserId) -> Result<Vec<Session>>;

    /// Idempotent.
    async fn add_member(&self, session_id: &SessionId, user_id: UserId) -> Result<()>;

    async fn is_member(&self, session_id: &SessionId, user_id: UserId) -> Result<bool>;
}

#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn insert_image(
        &self,
        session_id: &SessionId,
        name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<ImageId>;

    /// Images of a session in insertion order.
    async fn list_images(&self, session_id: &SessionId) -> Result<Vec<ImageSummary>>;

    async fn load_image(&self, image_id: ImageId) -> Result<Option<StoredImage>>;

    async fn session_for_image(&self, image_id: ImageId) -> Result<Option<SessionId>>;
}

#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Atomically records the vote unless the user already voted in the
    /// session, in which case `None` is returned and nothing is written.
    async fn insert_vote(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        image_id: ImageId,
    ) -> Result<Option<VoteId>>;

    async fn vote_in_session(&self, user_id: UserId, session_id: &SessionId)
        -> Result<Option<ImageId>>;

    /// One entry per image of the session (zero-vote images included), in
    /// image insertion order.
    async fn count_votes(&self, session_id: &SessionId) -> Result<Vec<TallyEntry>>;
}

/// Everything the voting core needs from a single backing store.
pub trait VotingStore: UserRepository + SessionRepository + ImageRepository + VoteRepository {}

impl<T> VotingStore for T where
    T: UserRepository + SessionRepository + ImageRepository + VoteRepository
{
}
