use super::*;

#[test]
fn hashes_verify_against_the_original_secret_only() {
    let stored = hash_credential("hunter2");
    assert!(stored.starts_with("sha256$"));
    assert!(verify_credential(&stored, "hunter2"));
    assert!(!verify_credential(&stored, "hunter3"));
}

#[test]
fn same_secret_gets_a_fresh_salt_each_time() {
    let first = hash_credential("hunter2");
    let second = hash_credential("hunter2");
    assert_ne!(first, second);
    assert!(verify_credential(&second, "hunter2"));
}

#[test]
fn malformed_hashes_never_verify() {
    assert!(!verify_credential("", "x"));
    assert!(!verify_credential("sha256$not-base64!$abc", "x"));
    assert!(!verify_credential("md5$c2FsdA==$ZGlnZXN0", "x"));
    let stored = hash_credential("x");
    assert!(!verify_credential(&format!("{stored}$extra"), "x"));
}

#[test]
fn empty_and_oversized_secrets_are_rejected() {
    assert_eq!(
        validate_secret("").expect_err("empty").code,
        ErrorCode::Validation
    );
    let huge = "a".repeat(MAX_CREDENTIAL_BYTES + 1);
    assert!(validate_secret(&huge).is_err());
    assert!(validate_secret("ok").is_ok());
}

#[test]
fn truncated_or_altered_digests_never_verify() {
    let stored = hash_credential("hunter2");
    let (prefix, digest_b64) = stored.rsplit_once('$').expect("digest part");
    let mut raw = STANDARD.decode(digest_b64).expect("digest");

    let truncated = format!("{prefix}${}", STANDARD.encode(&raw[..raw.len() - 1]));
    assert!(!verify_credential(&truncated, "hunter2"));

    raw[0] ^= 0x01;
    let flipped = format!("{prefix}${}", STANDARD.encode(&raw));
    assert!(!verify_credential(&flipped, "hunter2"));
}
