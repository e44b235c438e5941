use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use custody_envelope::{
    delegate, issue_root, verify, Clock, Command, Constraints, FixedClock, Keypair, Token, TokenError,
};

const T0: i64 = 1_700_000_000;

fn cmd(s: &str) -> Command {
    Command::parse(s).unwrap()
}

struct Fixture {
    clock: FixedClock,
    builder: Keypair,
    user: Keypair,
    root: Token,
    leaf: Token,
}

fn fixture() -> Fixture {
    let clock = FixedClock::new(T0);
    let builder = Keypair::generate();
    let user = Keypair::generate();
    let root = issue_root(&builder, cmd("/nil/db/data"), 7200, &clock).unwrap();
    let leaf = delegate(
        &root,
        cmd("/nil/db/data/create"),
        &user.did(),
        3600,
        &builder,
        &clock,
        Constraints::new(),
    )
    .unwrap();
    Fixture {
        clock,
        builder,
        user,
        root,
        leaf,
    }
}

#[test]
fn valid_chain_verifies() {
    let f = fixture();
    let chain = verify(&f.leaf, &[f.builder.did()], f.clock.now()).unwrap();
    assert_eq!(chain.command, cmd("/nil/db/data/create"));
    assert_eq!(chain.audience, f.user.did());
    assert_eq!(chain.subject, f.builder.did());
}

#[test]
fn expired_chain_reports_expired() {
    let f = fixture();
    let err = verify(&f.leaf, &[f.builder.did()], T0 + 3600).unwrap_err();
    assert_eq!(
        err,
        TokenError::Expired {
            expired_at: T0 + 3600,
            now: T0 + 3600
        }
    );
    // The root alone is still live.
    assert!(verify(&f.root, &[f.builder.did()], T0 + 3600).is_ok());
}

#[test]
fn unknown_root_rejected() {
    let f = fixture();
    let stranger = Keypair::generate();
    assert_eq!(
        verify(&f.leaf, &[stranger.did()], T0).unwrap_err(),
        TokenError::UntrustedRoot(f.builder.did().to_string())
    );
    assert!(matches!(
        verify(&f.leaf, &[], T0),
        Err(TokenError::UntrustedRoot(_))
    ));
}

#[test]
fn integrity_checked_before_expiry() {
    let f = fixture();
    let text = tamper_leaf(&f.leaf, |payload| {
        payload["command"] = serde_json::json!("/nil/db");
    });
    let forged = Token::decode(&text).unwrap();
    // Forged and expired: integrity wins.
    assert!(matches!(
        verify(&forged, &[f.builder.did()], T0 + 999_999),
        Err(TokenError::ChainInvalid(_))
    ));
}

#[test]
fn tampered_expiry_rejected() {
    let f = fixture();
    let text = tamper_leaf(&f.leaf, |payload| {
        payload["expires_at"] = serde_json::json!(T0 + 7000);
    });
    let forged = Token::decode(&text).unwrap();
    assert!(matches!(
        verify(&forged, &[f.builder.did()], T0),
        Err(TokenError::ChainInvalid(_))
    ));
}

#[test]
fn swapped_parent_rejected() {
    let f = fixture();
    // Same builder, different root: the proof no longer matches.
    let other_root = issue_root(&f.builder, cmd("/nil/db/data"), 7200, &f.clock).unwrap();
    let leaf_link = f.leaf.encode();
    let leaf_only = leaf_link.split('/').next().unwrap();
    let spliced = format!("{}/{}", leaf_only, other_root.encode());
    let token = Token::decode(&spliced).unwrap();
    assert!(matches!(
        verify(&token, &[f.builder.did()], T0),
        Err(TokenError::ChainInvalid(_))
    ));
}

#[test]
fn chain_of_custody_enforced_on_verify() {
    // A stranger signs a link on top of a chain addressed to someone else.
    let f = fixture();
    let stranger = Keypair::generate();
    let mut text = f.leaf.encode();
    let forged = delegate(
        &issue_root(&stranger, cmd("/nil/db/data/create"), 60, &f.clock).unwrap(),
        cmd("/nil/db/data/create"),
        &stranger.did(),
        30,
        &stranger,
        &f.clock,
        Constraints::new(),
    )
    .unwrap();
    let forged_leaf = forged.encode();
    let forged_link = forged_leaf.split('/').next().unwrap();
    text = format!("{}/{}", forged_link, text);
    let token = Token::decode(&text).unwrap();
    assert!(matches!(
        verify(&token, &[f.builder.did()], T0),
        Err(TokenError::ChainInvalid(_))
    ));
}

#[test]
fn encoded_token_survives_roundtrip() {
    let f = fixture();
    let back = Token::decode(&f.leaf.encode()).unwrap();
    assert_eq!(back.hash(), f.leaf.hash());
    assert_eq!(back.depth(), 1);
    let chain = verify(&back, &[f.builder.did()], T0 + 1).unwrap();
    assert_eq!(chain.holder, f.user.did());
}

#[test]
fn user_can_redelegate_narrower() {
    let f = fixture();
    let helper = Keypair::generate();
    let sub = f
        .leaf
        .extend()
        .audience(helper.did())
        .ttl(60)
        .delegate(&f.user, &f.clock)
        .unwrap();
    let chain = verify(&sub, &[f.builder.did()], T0).unwrap();
    assert_eq!(chain.holder, helper.did());
    assert_eq!(chain.depth, 2);
    assert_eq!(chain.expires_at, T0 + 60);
}

/// Re-encode the leaf with an edited payload but the original signature.
fn tamper_leaf(token: &Token, edit: impl FnOnce(&mut serde_json::Value)) -> String {
    let text = token.encode();
    let mut links: Vec<String> = text.split('/').map(str::to_string).collect();
    let (payload_b64, sig_b64) = links[0].split_once('.').unwrap();
    let raw = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
    let mut payload: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    edit(&mut payload);
    let edited = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
    links[0] = format!("{}.{}", edited, sig_b64);
    links.join("/")
}
