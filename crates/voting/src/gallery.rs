use std::sync::Arc;

use shared::{
    domain::{ImageId, ImageName, SessionId, StoredImage, UserId},
    error::{ApiError, ErrorCode},
    protocol::{ImageSummary, UploadOutcome},
    store::{ImageRepository, SessionRepository},
};
use tracing::{debug, info, warn};

use crate::{internal, require_session, transcode::Transcode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>, mime_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            data,
            mime_type: mime_type.map(str::to_string),
        }
    }
}

/// Images attached to sessions. Only a session's host may add to it.
#[derive(Clone)]
pub struct Gallery {
    sessions: Arc<dyn SessionRepository>,
    images: Arc<dyn ImageRepository>,
    transcoder: Arc<dyn Transcode>,
    max_image_bytes: usize,
}

impl Gallery {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        images: Arc<dyn ImageRepository>,
        transcoder: Arc<dyn Transcode>,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            sessions,
            images,
            transcoder,
            max_image_bytes,
        }
    }

    /// Stores each file independently. An unknown session or a non-host
    /// uploader fails the whole call before anything is stored; per-file
    /// problems are reported in the matching [`UploadOutcome`].
    pub async fn upload_images(
        &self,
        session_id: &SessionId,
        host_id: UserId,
        files: Vec<UploadFile>,
    ) -> Result<Vec<UploadOutcome>, ApiError> {
        let session = require_session(self.sessions.as_ref(), session_id).await?;
        if !session.is_host(host_id) {
            warn!(%session_id, user_id = host_id.0, "non-host upload rejected");
            return Err(ApiError::new(
                ErrorCode::Forbidden,
                "only the session host can upload images",
            ));
        }

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let outcome = match self.store_one(session_id, &file).await {
                Ok(image_id) => UploadOutcome::stored(file.name, image_id),
                Err(error) => {
                    warn!(%session_id, name = %file.name, code = ?error.code, "image rejected");
                    UploadOutcome::failed(file.name, error)
                }
            };
            outcomes.push(outcome);
        }

        let stored = outcomes.iter().filter(|o| o.is_stored()).count();
        info!(
            %session_id,
            stored,
            rejected = outcomes.len() - stored,
            "upload batch processed"
        );
        Ok(outcomes)
    }

    pub async fn list_images(&self, session_id: &SessionId) -> Result<Vec<ImageSummary>, ApiError> {
        require_session(self.sessions.as_ref(), session_id).await?;
        self.images.list_images(session_id).await.map_err(internal)
    }

    pub async fn get_image_data(&self, image_id: ImageId) -> Result<StoredImage, ApiError> {
        self.images
            .load_image(image_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ApiError::not_found("image"))
    }

    async fn store_one(
        &self,
        session_id: &SessionId,
        file: &UploadFile,
    ) -> Result<ImageId, ApiError> {
        let name = ImageName::parse(&file.name)?;
        if file.data.is_empty() {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "image payload cannot be empty",
            ));
        }
        if file.data.len() > self.max_image_bytes {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("image exceeds {} bytes", self.max_image_bytes),
            ));
        }

        let normalized = self
            .transcoder
            .normalize(&file.data, file.mime_type.as_deref())?;
        if normalized.transcoded {
            debug!(name = name.as_str(), mime_type = %normalized.mime_type, "image transcoded");
        }

        self.images
            .insert_image(session_id, name.as_str(), &normalized.mime_type, &normalized.data)
            .await
            .map_err(internal)
    }
}

#[cfg(test)]
#[path = "tests/gallery_tests.rs"]
mod tests;
