//! Routes presentation-layer requests to the core components and keeps each
//! user's active session.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    domain::{Participation, SessionId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{ClientRequest, ServerResponse, UploadFilePayload, UploadOutcome},
};
use tracing::debug;

use crate::{gallery::UploadFile, presence::Presence, VotingContext};

pub struct Dispatcher {
    ctx: VotingContext,
    presence: Presence,
}

impl Dispatcher {
    pub fn new(ctx: VotingContext) -> Self {
        Self {
            ctx,
            presence: Presence::new(),
        }
    }

    pub fn context(&self) -> &VotingContext {
        &self.ctx
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub async fn handle(&mut self, request: ClientRequest) -> Result<ServerResponse, ApiError> {
        match request {
            ClientRequest::SignIn {
                username,
                credential,
            } => {
                let user_id = self
                    .ctx
                    .directory
                    .register_or_authenticate(&username, credential.as_deref())
                    .await?;
                Ok(ServerResponse::SignedIn { user_id })
            }
            ClientRequest::SignUp {
                username,
                credential,
            } => {
                let user_id = self.ctx.directory.sign_up(&username, &credential).await?;
                Ok(ServerResponse::SignedIn { user_id })
            }
            ClientRequest::CreateSession { user_id, name } => {
                let session_id = self.ctx.registry.create_session(&name, user_id).await?;
                self.presence.enter(user_id, session_id.clone());
                Ok(ServerResponse::SessionCreated { session_id })
            }
            ClientRequest::ListSessions => Ok(ServerResponse::Sessions {
                sessions: self.ctx.registry.list_active_sessions().await?,
            }),
            ClientRequest::JoinSession {
                user_id,
                session_id,
            } => {
                let session_id = normalize(&session_id)?;
                let view = self.ctx.registry.join_session(&session_id, user_id).await?;
                self.presence.enter(user_id, session_id);
                Ok(ServerResponse::Joined {
                    session: view.session,
                    participation: view.participation,
                })
            }
            ClientRequest::LeaveSession {
                user_id,
                session_id,
            } => {
                let session_id = normalize(&session_id)?;
                self.ctx.registry.get_session(&session_id).await?;
                if !self.presence.leave(user_id, &session_id) {
                    debug!(%session_id, user_id = user_id.0, "leave for inactive session");
                }
                Ok(ServerResponse::Left {
                    session_id,
                    participation: Participation::NotJoined,
                })
            }
            ClientRequest::UploadImages {
                user_id,
                session_id,
                files,
            } => {
                let session_id = normalize(&session_id)?;
                self.require_joined(user_id, &session_id, "uploading").await?;
                let outcomes = self.upload(user_id, &session_id, files).await?;
                Ok(ServerResponse::Uploaded { outcomes })
            }
            ClientRequest::ListImages { session_id } => {
                let session_id = normalize(&session_id)?;
                Ok(ServerResponse::Images {
                    images: self.ctx.gallery.list_images(&session_id).await?,
                })
            }
            ClientRequest::CastVote {
                user_id,
                session_id,
                image_id,
            } => {
                let session_id = normalize(&session_id)?;
                self.require_joined(user_id, &session_id, "voting").await?;
                self.ctx
                    .ledger
                    .cast_vote(user_id, &session_id, image_id)
                    .await?;
                Ok(ServerResponse::VoteRecorded {
                    session_id,
                    image_id,
                })
            }
            ClientRequest::Tally { session_id } => {
                let session_id = normalize(&session_id)?;
                Ok(ServerResponse::Results {
                    results: self.ctx.ledger.results(&session_id).await?,
                })
            }
        }
    }

    /// Decodes payloads, hands the decodable ones to the gallery and merges
    /// both kinds of outcome back into request order.
    async fn upload(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        files: Vec<UploadFilePayload>,
    ) -> Result<Vec<UploadOutcome>, ApiError> {
        let mut slots = Vec::with_capacity(files.len());
        let mut decoded = Vec::new();
        for file in files {
            match STANDARD.decode(file.data_b64.as_bytes()) {
                Ok(data) => {
                    decoded.push(UploadFile::new(file.name, data, file.mime_type.as_deref()));
                    slots.push(None);
                }
                Err(_) => slots.push(Some(UploadOutcome::failed(
                    file.name,
                    ApiError::new(ErrorCode::Validation, "image payload is not valid base64"),
                ))),
            }
        }

        let mut stored = self
            .ctx
            .gallery
            .upload_images(session_id, user_id, decoded)
            .await?
            .into_iter();
        Ok(slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| stored.next()))
            .collect())
    }

    /// The session must be the user's active one and backed by a stored
    /// membership.
    async fn require_joined(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        action: &str,
    ) -> Result<(), ApiError> {
        if self.presence.is_active(user_id, session_id)
            && self.ctx.registry.is_member(session_id, user_id).await?
        {
            return Ok(());
        }
        Err(ApiError::new(
            ErrorCode::Validation,
            format!("join session {session_id} before {action}"),
        ))
    }
}

fn normalize(session_id: &SessionId) -> Result<SessionId, ApiError> {
    SessionId::from_input(session_id.as_str()).ok_or_else(|| ApiError::not_found("session"))
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
