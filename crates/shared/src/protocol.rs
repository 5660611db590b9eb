use serde::{Deserialize, Serialize};

use crate::{
    domain::{ImageId, Participation, Session, SessionId, UserId},
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    SignIn {
        username: String,
        #[serde(default)]
        credential: Option<String>,
    },
    SignUp {
        username: String,
        credential: String,
    },
    CreateSession {
        user_id: UserId,
        name: String,
    },
    ListSessions,
    JoinSession {
        user_id: UserId,
        session_id: SessionId,
    },
    LeaveSession {
        user_id: UserId,
        session_id: SessionId,
    },
    UploadImages {
        user_id: UserId,
        session_id: SessionId,
        files: Vec<UploadFilePayload>,
    },
    ListImages {
        session_id: SessionId,
    },
    CastVote {
        user_id: UserId,
        session_id: SessionId,
        image_id: ImageId,
    },
    Tally {
        session_id: SessionId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFilePayload {
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerResponse {
    SignedIn {
        user_id: UserId,
    },
    SessionCreated {
        session_id: SessionId,
    },
    Sessions {
        sessions: Vec<SessionSummary>,
    },
    Joined {
        session: Session,
        participation: Participation,
    },
    Left {
        session_id: SessionId,
        participation: Participation,
    },
    Uploaded {
        outcomes: Vec<UploadOutcome>,
    },
    Images {
        images: Vec<ImageSummary>,
    },
    VoteRecorded {
        session_id: SessionId,
        image_id: ImageId,
    },
    Results {
        results: SessionResults,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub name: String,
    pub host_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub image_id: ImageId,
    pub name: String,
    pub mime_type: String,
}

/// Per-file result of a batch upload. Exactly one of `image_id` and `error`
/// is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub name: String,
    pub image_id: Option<ImageId>,
    pub error: Option<ApiError>,
}

impl UploadOutcome {
    pub fn stored(name: impl Into<String>, image_id: ImageId) -> Self {
        Self {
            name: name.into(),
            image_id: Some(image_id),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: ApiError) -> Self {
        Self {
            name: name.into(),
            image_id: None,
            error: Some(error),
        }
    }

    pub fn is_stored(&self) -> bool {
        self.image_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    pub image_id: ImageId,
    pub name: String,
    pub votes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResults {
    pub session_id: SessionId,
    pub entries: Vec<TallyEntry>,
    pub total_votes: u64,
}

impl SessionResults {
    pub fn leader(&self) -> Option<&TallyEntry> {
        self.entries.first().filter(|entry| entry.votes > 0)
    }
}
