use super::*;
use crate::{
    test_support::{context, context_with, hosted_session, png_file, user},
    VotingConfig,
};

#[tokio::test]
async fn creating_a_session_makes_the_creator_host() {
    let ctx = context().await;
    let host = user(&ctx, "host").await;
    let session_id = ctx
        .registry
        .create_session("Party", host)
        .await
        .expect("create");

    let session = ctx.registry.get_session(&session_id).await.expect("get");
    assert_eq!(session.name, "Party");
    assert!(session.is_host(host));
    assert_eq!(session.host_username, "host");
    assert!(ctx.registry.is_member(&session_id, host).await.expect("member"));
}

#[tokio::test]
async fn short_codes_are_six_uppercase_alphanumerics() {
    let ctx = context().await;
    let (_, session_id) = hosted_session(&ctx, "Party").await;
    let raw = session_id.as_str();
    assert_eq!(raw.len(), SHORT_CODE_LEN);
    assert!(raw
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
}

#[tokio::test]
async fn uuid_style_generates_full_tokens() {
    let ctx = context_with(VotingConfig {
        session_id_style: SessionIdStyle::Uuid,
        ..VotingConfig::default()
    })
    .await;
    let (_, session_id) = hosted_session(&ctx, "Party").await;
    assert!(uuid::Uuid::parse_str(session_id.as_str()).is_ok());
}

#[tokio::test]
async fn blank_session_name_is_rejected() {
    let ctx = context().await;
    let host = user(&ctx, "host").await;
    let err = ctx
        .registry
        .create_session("   ", host)
        .await
        .expect_err("blank");
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(ctx
        .registry
        .list_active_sessions()
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn unknown_host_cannot_create_sessions() {
    let ctx = context().await;
    let err = ctx
        .registry
        .create_session("Party", UserId(77))
        .await
        .expect_err("unknown host");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn id_collisions_are_retried_then_reported() {
    let ctx = context().await;
    let host = user(&ctx, "host").await;
    let registry = ctx
        .registry
        .clone()
        .with_id_source(|| SessionId::new("SAME01"));

    let first = registry.create_session("One", host).await.expect("first");
    assert_eq!(first.as_str(), "SAME01");

    let err = registry
        .create_session("Two", host)
        .await
        .expect_err("exhausted");
    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(
        registry.get_session(&first).await.expect("kept").name,
        "One"
    );
}

#[tokio::test]
async fn collision_retry_eventually_finds_a_free_id() {
    let ctx = context().await;
    let host = user(&ctx, "host").await;
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let registry = ctx.registry.clone().with_id_source(move || {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        // Draws 1 and 2 collide with the seeded session.
        SessionId::new(if n < 3 { "TAKEN1".to_string() } else { format!("FREE{n:02}") })
    });

    registry.create_session("Seed", host).await.expect("seed");
    let second = registry.create_session("Next", host).await.expect("next");
    assert_eq!(second.as_str(), "FREE03");
}

#[tokio::test]
async fn lists_sessions_with_host_names_in_creation_order() {
    let ctx = context().await;
    let (_, first) = hosted_session(&ctx, "First").await;
    let (_, second) = hosted_session(&ctx, "Second").await;

    let sessions = ctx.registry.list_active_sessions().await.expect("list");
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].session_id, first);
    assert_eq!(sessions[0].host_username, "First-host");
    assert_eq!(sessions[1].session_id, second);
}

#[tokio::test]
async fn sessions_hosted_by_only_lists_own_sessions() {
    let ctx = context().await;
    let (host, mine) = hosted_session(&ctx, "Mine").await;
    hosted_session(&ctx, "Theirs").await;

    let hosted = ctx.registry.sessions_hosted_by(host).await.expect("hosted");
    assert_eq!(hosted.len(), 1);
    assert_eq!(hosted[0].session_id, mine);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let ctx = context().await;
    let guest = user(&ctx, "guest").await;
    let missing = SessionId::new("NOPE00");

    let err = ctx.registry.get_session(&missing).await.expect_err("get");
    assert_eq!(err.code, ErrorCode::NotFound);
    let err = ctx
        .registry
        .join_session(&missing, guest)
        .await
        .expect_err("join");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn non_hosts_can_join_and_rejoin_resumes_voted_state() {
    let ctx = context().await;
    let (host, session_id) = hosted_session(&ctx, "Party").await;
    let guest = user(&ctx, "guest").await;

    let view = ctx
        .registry
        .join_session(&session_id, guest)
        .await
        .expect("join");
    assert_eq!(view.participation, Participation::Joined);
    assert!(ctx.registry.is_member(&session_id, guest).await.expect("member"));

    let outcomes = ctx
        .gallery
        .upload_images(&session_id, host, vec![png_file("cat.png")])
        .await
        .expect("upload");
    let cat = outcomes[0].image_id.expect("stored");
    ctx.ledger
        .cast_vote(guest, &session_id, cat)
        .await
        .expect("vote");

    let rejoined = ctx
        .registry
        .join_session(&session_id, guest)
        .await
        .expect("rejoin");
    assert_eq!(rejoined.participation, Participation::Voted { image_id: cat });
}
