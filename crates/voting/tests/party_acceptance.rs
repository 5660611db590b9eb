use std::{io::Cursor, sync::Arc};

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use shared::{
    domain::{Participation, SessionIdStyle},
    error::ErrorCode,
};
use storage::Storage;
use voting::{UploadFile, VotingConfig, VotingContext};

fn fixture(format: ImageFormat, shade: u8) -> Vec<u8> {
    let pixels = RgbaImage::from_fn(8, 8, |x, _| Rgba([shade, x as u8 * 16, 90, 255]));
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(pixels).to_rgb8()),
        _ => DynamicImage::ImageRgba8(pixels),
    };
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).expect("encode fixture");
    out.into_inner()
}

async fn open(config: VotingConfig) -> VotingContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    VotingContext::new(Arc::new(storage), config)
}

#[tokio::test]
async fn party_round_from_upload_to_leaderboard() {
    let ctx = open(VotingConfig::default()).await;
    let host = ctx
        .directory
        .register_or_authenticate("hannah", Some("host-secret"))
        .await
        .expect("host");
    let s1 = ctx
        .registry
        .create_session("Party", host)
        .await
        .expect("session");
    assert_eq!(s1.as_str().len(), 6);

    let outcomes = ctx
        .gallery
        .upload_images(
            &s1,
            host,
            vec![
                UploadFile::new("cat.png", fixture(ImageFormat::Png, 10), None),
                UploadFile::new("dog.jpg", fixture(ImageFormat::Jpeg, 200), None),
            ],
        )
        .await
        .expect("upload");
    let cat = outcomes[0].image_id.expect("cat");
    let dog = outcomes[1].image_id.expect("dog");

    for name in ["a", "b"] {
        let voter = ctx
            .directory
            .register_or_authenticate(name, Some("pw"))
            .await
            .expect("voter");
        let view = ctx.registry.join_session(&s1, voter).await.expect("join");
        assert_eq!(view.participation, Participation::Joined);
        ctx.ledger.cast_vote(voter, &s1, cat).await.expect("vote");
    }

    let tally = ctx.ledger.tally(&s1).await.expect("tally");
    let view: Vec<_> = tally
        .iter()
        .map(|entry| (entry.name.as_str(), entry.votes))
        .collect();
    assert_eq!(view, vec![("cat.png", 2), ("dog.jpg", 0)]);

    let a = ctx
        .directory
        .sign_in("a", Some("pw"))
        .await
        .expect("sign in again");
    let err = ctx
        .ledger
        .cast_vote(a, &s1, dog)
        .await
        .expect_err("second vote");
    assert_eq!(err.code, ErrorCode::AlreadyVoted);

    let rejoined = ctx.registry.join_session(&s1, a).await.expect("rejoin");
    assert_eq!(
        rejoined.participation,
        Participation::Voted { image_id: cat }
    );
}

#[tokio::test]
async fn uuid_sessions_work_end_to_end() {
    let ctx = open(VotingConfig {
        session_id_style: SessionIdStyle::Uuid,
        ..VotingConfig::default()
    })
    .await;
    let host = ctx
        .directory
        .sign_up("uma", "pw")
        .await
        .expect("host");
    let session_id = ctx
        .registry
        .create_session("Long ids", host)
        .await
        .expect("session");
    assert_eq!(session_id.as_str().len(), 36);

    let hosted = ctx
        .registry
        .sessions_hosted_by(host)
        .await
        .expect("hosted");
    assert_eq!(hosted.len(), 1);
    assert_eq!(hosted[0].session_id, session_id);
    assert_eq!(hosted[0].host_username, "uma");
}
