use anyhow::{anyhow, Context};

use super::*;

#[test]
fn storage_failures_do_not_leak_details() {
    let err = Err::<(), _>(anyhow!("UNIQUE constraint failed: users.username"))
        .context("failed to open database 'sqlite:///srv/picvote/votes.db'")
        .expect_err("error");

    let api = internal(err);
    assert_eq!(api.code, ErrorCode::Internal);
    assert_eq!(api.message, "internal storage error");
    assert!(!api.message.contains("sqlite"));
}
