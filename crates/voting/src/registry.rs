use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{
        Participation, Session, SessionId, SessionIdStyle, SessionName, UserId, SHORT_CODE_LEN,
    },
    error::{ApiError, ErrorCode},
    protocol::SessionSummary,
    store::{SessionRepository, UserRepository, VoteRepository},
};
use tracing::{debug, info};

use crate::{internal, require_session, require_user};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_ID_ATTEMPTS: usize = 8;

type IdSource = Arc<dyn Fn() -> SessionId + Send + Sync>;

/// A session as one user sees it right after joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session: Session,
    pub participation: Participation,
}

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    votes: Arc<dyn VoteRepository>,
    next_id: IdSource,
}

impl SessionRegistry {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        votes: Arc<dyn VoteRepository>,
        style: SessionIdStyle,
    ) -> Self {
        let next_id: IdSource = match style {
            SessionIdStyle::ShortCode => Arc::new(short_code),
            SessionIdStyle::Uuid => {
                Arc::new(|| SessionId::new(uuid::Uuid::new_v4().to_string()))
            }
        };
        Self {
            sessions,
            users,
            votes,
            next_id,
        }
    }

    /// Replaces the id generator; collisions are still detected and retried.
    pub fn with_id_source(
        mut self,
        source: impl Fn() -> SessionId + Send + Sync + 'static,
    ) -> Self {
        self.next_id = Arc::new(source);
        self
    }

    /// Creates a session hosted by `host_id`, who also becomes its first
    /// member.
    pub async fn create_session(&self, name: &str, host_id: UserId) -> Result<SessionId, ApiError> {
        let name = SessionName::parse(name)?;
        require_user(self.users.as_ref(), host_id).await?;

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let session_id = (self.next_id)();
            let inserted = self
                .sessions
                .insert_session(&session_id, name.as_str(), host_id)
                .await
                .map_err(internal)?;
            if inserted {
                info!(%session_id, host_id = host_id.0, name = name.as_str(), "session created");
                return Ok(session_id);
            }
            debug!(%session_id, attempt, "session id collision");
        }

        Err(ApiError::new(
            ErrorCode::Internal,
            "could not allocate a unique session id",
        ))
    }

    /// Every session ever created, oldest first.
    pub async fn list_active_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        let sessions = self.sessions.list_sessions().await.map_err(internal)?;
        Ok(sessions.into_iter().map(summary).collect())
    }

    pub async fn sessions_hosted_by(
        &self,
        host_id: UserId,
    ) -> Result<Vec<SessionSummary>, ApiError> {
        let sessions = self
            .sessions
            .list_sessions_hosted_by(host_id)
            .await
            .map_err(internal)?;
        Ok(sessions.into_iter().map(summary).collect())
    }

    pub async fn get_session(&self, session_id: &SessionId) -> Result<Session, ApiError> {
        require_session(self.sessions.as_ref(), session_id).await
    }

    /// Any user may join any existing session. Joining again is harmless
    /// and reports the vote already cast, if any.
    pub async fn join_session(
        &self,
        session_id: &SessionId,
        user_id: UserId,
    ) -> Result<SessionView, ApiError> {
        let session = require_session(self.sessions.as_ref(), session_id).await?;
        require_user(self.users.as_ref(), user_id).await?;

        self.sessions
            .add_member(session_id, user_id)
            .await
            .map_err(internal)?;
        let participation = match self
            .votes
            .vote_in_session(user_id, session_id)
            .await
            .map_err(internal)?
        {
            Some(image_id) => Participation::Voted { image_id },
            None => Participation::Joined,
        };
        debug!(%session_id, user_id = user_id.0, ?participation, "session joined");
        Ok(SessionView {
            session,
            participation,
        })
    }

    pub async fn is_member(
        &self,
        session_id: &SessionId,
        user_id: UserId,
    ) -> Result<bool, ApiError> {
        self.sessions
            .is_member(session_id, user_id)
            .await
            .map_err(internal)
    }
}

fn short_code() -> SessionId {
    let mut rng = rand::thread_rng();
    let code: String = (0..SHORT_CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect();
    SessionId::new(code)
}

fn summary(session: Session) -> SessionSummary {
    SessionSummary {
        session_id: session.session_id,
        name: session.name,
        host_username: session.host_username,
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
