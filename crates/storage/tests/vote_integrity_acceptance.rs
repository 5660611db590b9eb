use shared::{
    domain::SessionId,
    store::{ImageRepository, SessionRepository, UserRepository, VoteRepository},
};
use storage::Storage;

async fn file_storage(dir: &tempfile::TempDir) -> Storage {
    let db_path = dir.path().join("votes.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    Storage::new(&database_url).await.expect("db")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_votes_by_one_user_record_exactly_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = file_storage(&dir).await;

    let host = storage
        .insert_user("race-host", None)
        .await
        .expect("insert")
        .expect("host");
    let voter = storage
        .insert_user("race-voter", None)
        .await
        .expect("insert")
        .expect("voter");
    let session = SessionId::new("RACE01");
    storage
        .insert_session(&session, "Race", host)
        .await
        .expect("session");
    let cat = storage
        .insert_image(&session, "cat.png", "image/png", b"cat")
        .await
        .expect("cat");
    let dog = storage
        .insert_image(&session, "dog.png", "image/png", b"dog")
        .await
        .expect("dog");

    let mut attempts = Vec::new();
    for round in 0..8 {
        let storage = storage.clone();
        let session = session.clone();
        let target = if round % 2 == 0 { cat } else { dog };
        attempts.push(tokio::spawn(async move {
            storage.insert_vote(voter, &session, target).await
        }));
    }

    let mut recorded = 0;
    for attempt in attempts {
        if attempt.await.expect("join").expect("insert").is_some() {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 1);

    let counts = storage.count_votes(&session).await.expect("counts");
    let total: u64 = counts.iter().map(|entry| entry.votes).sum();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn votes_survive_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = SessionId::new("KEEP01");
    let (voter, cat) = {
        let storage = file_storage(&dir).await;
        let host = storage
            .insert_user("keeper", None)
            .await
            .expect("insert")
            .expect("host");
        storage
            .insert_session(&session, "Keep", host)
            .await
            .expect("session");
        let cat = storage
            .insert_image(&session, "cat.png", "image/png", b"cat")
            .await
            .expect("cat");
        storage.insert_vote(host, &session, cat).await.expect("vote");
        storage.pool().close().await;
        (host, cat)
    };

    let reopened = file_storage(&dir).await;
    assert_eq!(
        reopened
            .vote_in_session(voter, &session)
            .await
            .expect("lookup"),
        Some(cat)
    );
    assert!(reopened
        .insert_vote(voter, &session, cat)
        .await
        .expect("insert")
        .is_none());
}
