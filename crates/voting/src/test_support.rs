use std::{io::Cursor, sync::Arc};

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use shared::domain::{AuthMode, SessionId, UserId};
use storage::Storage;

use crate::{UploadFile, VotingConfig, VotingContext};

pub(crate) async fn context() -> VotingContext {
    context_with(VotingConfig::default()).await
}

pub(crate) async fn name_only_context() -> VotingContext {
    context_with(VotingConfig {
        auth_mode: AuthMode::NameOnly,
        ..VotingConfig::default()
    })
    .await
}

pub(crate) async fn context_with(config: VotingConfig) -> VotingContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    VotingContext::new(Arc::new(storage), config)
}

pub(crate) async fn user(ctx: &VotingContext, name: &str) -> UserId {
    ctx.directory
        .register_or_authenticate(name, Some("secret"))
        .await
        .expect("user")
}

/// A host with a fresh session.
pub(crate) async fn hosted_session(ctx: &VotingContext, name: &str) -> (UserId, SessionId) {
    let host = user(ctx, &format!("{name}-host")).await;
    let session = ctx
        .registry
        .create_session(name, host)
        .await
        .expect("session");
    (host, session)
}

pub(crate) fn checkerboard() -> RgbaImage {
    RgbaImage::from_fn(4, 3, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([200, 30, 30, 255])
        } else {
            Rgba([10, 120, 240, 255])
        }
    })
}

pub(crate) fn encode(image: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let dynamic = match format {
        // The JPEG encoder has no alpha channel support.
        ImageFormat::Jpeg => {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8())
        }
        _ => DynamicImage::ImageRgba8(image.clone()),
    };
    let mut out = Cursor::new(Vec::new());
    dynamic.write_to(&mut out, format).expect("encode fixture");
    out.into_inner()
}

pub(crate) fn png_file(name: &str) -> UploadFile {
    UploadFile::new(
        name,
        encode(&checkerboard(), ImageFormat::Png),
        Some("image/png"),
    )
}

pub(crate) fn jpeg_file(name: &str) -> UploadFile {
    UploadFile::new(
        name,
        encode(&checkerboard(), ImageFormat::Jpeg),
        Some("image/jpeg"),
    )
}
