use std::sync::Arc;

use shared::{
    domain::{ImageId, SessionId, UserId, VoteId},
    error::{ApiError, ErrorCode},
    protocol::{SessionResults, TallyEntry},
    store::{ImageRepository, SessionRepository, UserRepository, VoteRepository},
};
use tracing::{info, warn};

use crate::{internal, require_session, require_user};

/// One immutable vote per user and session, and the counts derived from
/// them.
#[derive(Clone)]
pub struct VoteLedger {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    images: Arc<dyn ImageRepository>,
    votes: Arc<dyn VoteRepository>,
}

impl VoteLedger {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        images: Arc<dyn ImageRepository>,
        votes: Arc<dyn VoteRepository>,
    ) -> Self {
        Self {
            sessions,
            users,
            images,
            votes,
        }
    }

    pub async fn has_voted(
        &self,
        user_id: UserId,
        session_id: &SessionId,
    ) -> Result<bool, ApiError> {
        Ok(self.vote_of(user_id, session_id).await?.is_some())
    }

    /// The image `user_id` voted for in `session_id`, if any.
    pub async fn vote_of(
        &self,
        user_id: UserId,
        session_id: &SessionId,
    ) -> Result<Option<ImageId>, ApiError> {
        self.votes
            .vote_in_session(user_id, session_id)
            .await
            .map_err(internal)
    }

    /// Records `user_id`'s only vote in `session_id`.
    ///
    /// The duplicate check happens inside the insert, so concurrent attempts
    /// by the same user yield one success and `AlreadyVoted` for the rest.
    pub async fn cast_vote(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        image_id: ImageId,
    ) -> Result<VoteId, ApiError> {
        require_session(self.sessions.as_ref(), session_id).await?;
        require_user(self.users.as_ref(), user_id).await?;

        let owner = self
            .images
            .session_for_image(image_id)
            .await
            .map_err(internal)?;
        if owner.as_ref() != Some(session_id) {
            return Err(ApiError::new(
                ErrorCode::NotFound,
                "image not found in this session",
            ));
        }

        match self
            .votes
            .insert_vote(user_id, session_id, image_id)
            .await
            .map_err(internal)?
        {
            Some(vote_id) => {
                info!(%session_id, user_id = user_id.0, image_id = image_id.0, "vote recorded");
                Ok(vote_id)
            }
            None => {
                warn!(%session_id, user_id = user_id.0, "duplicate vote rejected");
                Err(ApiError::new(
                    ErrorCode::AlreadyVoted,
                    "you have already voted in this session",
                ))
            }
        }
    }

    /// Images ranked by votes, most first; ties keep upload order.
    pub async fn tally(&self, session_id: &SessionId) -> Result<Vec<TallyEntry>, ApiError> {
        require_session(self.sessions.as_ref(), session_id).await?;
        let mut entries = self
            .votes
            .count_votes(session_id)
            .await
            .map_err(internal)?;
        entries.sort_by(|a, b| b.votes.cmp(&a.votes));
        Ok(entries)
    }

    pub async fn results(&self, session_id: &SessionId) -> Result<SessionResults, ApiError> {
        let entries = self.tally(session_id).await?;
        let total_votes = entries.iter().map(|entry| entry.votes).sum();
        Ok(SessionResults {
            session_id: session_id.clone(),
            entries,
            total_votes,
        })
    }
}

#[cfg(test)]
#[path = "tests/ledger_tests.rs"]
mod tests;
