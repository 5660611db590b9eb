use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ErrorCode};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ImageId);
id_newtype!(VoteId);

/// Opaque session token. Either a short join code or a UUID, depending on how
/// the registry was configured; callers must not rely on its shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Normalises user-typed input: surrounding whitespace is dropped, short
    /// codes are matched case-insensitively and UUIDs are rewritten to their
    /// lowercase hyphenated form.
    pub fn from_input(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_SESSION_ID_BYTES {
            return None;
        }
        if trimmed.len() == SHORT_CODE_LEN && trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Some(Self(trimmed.to_ascii_uppercase()));
        }
        if let Ok(uuid) = uuid::Uuid::parse_str(trimmed) {
            return Some(Self(uuid.to_string()));
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const SHORT_CODE_LEN: usize = 6;
const MAX_SESSION_ID_BYTES: usize = 64;

pub const MAX_USERNAME_CHARS: usize = 64;
pub const MAX_SESSION_NAME_CHARS: usize = 120;
pub const MAX_IMAGE_NAME_BYTES: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    Credentialed,
    /// Demo-only: a username alone identifies a user.
    NameOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionIdStyle {
    #[default]
    ShortCode,
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ApiError::new(ErrorCode::Validation, "username cannot be empty"));
        }
        if trimmed.chars().count() > MAX_USERNAME_CHARS {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("username exceeds {MAX_USERNAME_CHARS} characters"),
            ));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "username must not contain control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionName(String);

impl SessionName {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "session name cannot be empty",
            ));
        }
        if trimmed.chars().count() > MAX_SESSION_NAME_CHARS {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("session name exceeds {MAX_SESSION_NAME_CHARS} characters"),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageName(String);

impl ImageName {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ApiError::new(ErrorCode::Validation, "image name cannot be empty"));
        }
        if trimmed.len() > MAX_IMAGE_NAME_BYTES {
            return Err(ApiError::new(ErrorCode::Validation, "image name is too long"));
        }
        if trimmed.contains('/') || trimmed.contains('\\') {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "image name must not contain path separators",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub credential_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub name: String,
    pub host_id: UserId,
    pub host_username: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_host(&self, user_id: UserId) -> bool {
        self.host_id == user_id
    }
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub image_id: ImageId,
    pub session_id: SessionId,
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Where a user stands in one session, as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Participation {
    NotJoined,
    Joined,
    Voted { image_id: ImageId },
}

impl Participation {
    pub fn has_voted(&self) -> bool {
        matches!(self, Self::Voted { .. })
    }
}
