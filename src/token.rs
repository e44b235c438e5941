//! Capability tokens: signed, hash-linked delegation chains.
//!
//! A chain starts at a self-issued root and narrows at every link: the command
//! may only get longer, the expiry may only get earlier, and constraints set by
//! an ancestor can't be changed. An invocation closes the chain.
//!
//! Text form, leaf first:
//!
//! ```text
//! base64url(payload_json).base64url(sig) / ... / base64url(root_payload).base64url(root_sig)
//! ```
//!
//! Decoding only parses. Authority comes from [`verify`] alone.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::command::Command;
use crate::error::TokenError;
use crate::identity::{Did, Keypair};

/// Longest permitted chain below the root.
pub const MAX_CHAIN_DEPTH: usize = 16;

const TOKEN_NONCE_BYTES: usize = 16;
const LINK_SEPARATOR: &str = "/";
const PART_SEPARATOR: char = '.';

/// Free-form key/value map carried in a token body.
pub type Constraints = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenBody {
    Delegation {
        #[serde(default)]
        constraints: Constraints,
    },
    Invocation {
        #[serde(default)]
        arguments: Constraints,
    },
}

impl TokenBody {
    pub fn is_invocation(&self) -> bool {
        matches!(self, TokenBody::Invocation { .. })
    }
}

/// Signed portion of one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub issuer: Did,
    pub audience: Did,
    pub subject: Did,
    pub command: Command,
    pub expires_at: i64,
    pub issued_at: i64,
    pub nonce: String,
    pub body: TokenBody,
    /// Hash of the parent link; `None` on the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

/// One link of a capability chain together with its ancestors.
#[derive(Clone)]
pub struct Token {
    payload: TokenPayload,
    raw_payload: Vec<u8>,
    signature: Vec<u8>,
    parent: Option<Arc<Token>>,
}

impl Token {
    fn sign(payload: TokenPayload, signer: &Keypair, parent: Option<Arc<Token>>) -> Result<Self, TokenError> {
        let raw_payload =
            serde_json::to_vec(&payload).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let signature = signer.sign(&raw_payload).to_vec();
        Ok(Self {
            payload,
            raw_payload,
            signature,
            parent,
        })
    }

    pub fn payload(&self) -> &TokenPayload {
        &self.payload
    }

    pub fn issuer(&self) -> &Did {
        &self.payload.issuer
    }

    pub fn audience(&self) -> &Did {
        &self.payload.audience
    }

    pub fn subject(&self) -> &Did {
        &self.payload.subject
    }

    pub fn command(&self) -> &Command {
        &self.payload.command
    }

    pub fn expires_at(&self) -> i64 {
        self.payload.expires_at
    }

    pub fn issued_at(&self) -> i64 {
        self.payload.issued_at
    }

    pub fn body(&self) -> &TokenBody {
        &self.payload.body
    }

    pub fn proof(&self) -> Option<&str> {
        self.payload.proof.as_deref()
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn parent(&self) -> Option<&Arc<Token>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_invocation(&self) -> bool {
        self.payload.body.is_invocation()
    }

    /// Number of links above this one.
    pub fn depth(&self) -> usize {
        self.links().len() - 1
    }

    /// SHA-256 (hex) of this link's signed payload and signature.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.raw_payload);
        hasher.update(&self.signature);
        hex::encode(hasher.finalize())
    }

    /// Constraints in force at this link: every ancestor's plus this one's.
    pub fn effective_constraints(&self) -> Constraints {
        let mut merged = Constraints::new();
        for link in self.links().into_iter().rev() {
            if let TokenBody::Delegation { constraints } = link.body() {
                for (k, v) in constraints {
                    merged.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
        merged
    }

    /// Links from this token up to the root.
    fn links(&self) -> Vec<&Token> {
        let mut links = vec![self];
        let mut current = self.parent.as_deref();
        while let Some(link) = current {
            links.push(link);
            current = link.parent.as_deref();
        }
        links
    }

    /// Start narrowing this token.
    pub fn extend(&self) -> TokenBuilder<'_> {
        TokenBuilder::new(self)
    }

    pub fn encode(&self) -> String {
        let links: Vec<String> = self
            .links()
            .into_iter()
            .map(|link| {
                format!(
                    "{}{}{}",
                    URL_SAFE_NO_PAD.encode(&link.raw_payload),
                    PART_SEPARATOR,
                    URL_SAFE_NO_PAD.encode(&link.signature)
                )
            })
            .collect();
        links.join(LINK_SEPARATOR)
    }

    pub fn decode(text: &str) -> Result<Self, TokenError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TokenError::Malformed("empty token".into()));
        }
        let links: Vec<&str> = text.split(LINK_SEPARATOR).collect();
        if links.len() > MAX_CHAIN_DEPTH + 1 {
            return Err(TokenError::ChainTooDeep(MAX_CHAIN_DEPTH));
        }

        let mut parent: Option<Arc<Token>> = None;
        for link in links.into_iter().rev() {
            let (payload_b64, sig_b64) = link
                .split_once(PART_SEPARATOR)
                .ok_or_else(|| TokenError::Malformed("link without signature".into()))?;
            let raw_payload = URL_SAFE_NO_PAD
                .decode(payload_b64)
                .map_err(|e| TokenError::Malformed(format!("payload encoding: {e}")))?;
            let signature = URL_SAFE_NO_PAD
                .decode(sig_b64)
                .map_err(|e| TokenError::Malformed(format!("signature encoding: {e}")))?;
            let payload: TokenPayload = serde_json::from_slice(&raw_payload)
                .map_err(|e| TokenError::Malformed(format!("payload: {e}")))?;
            parent = Some(Arc::new(Token {
                payload,
                raw_payload,
                signature,
                parent,
            }));
        }

        // `links` was non-empty, so at least one link was built.
        parent
            .map(|leaf| Arc::try_unwrap(leaf).unwrap_or_else(|shared| (*shared).clone()))
            .ok_or_else(|| TokenError::Malformed("empty token".into()))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("issuer", &self.payload.issuer)
            .field("audience", &self.payload.audience)
            .field("command", &self.payload.command)
            .field("expires_at", &self.payload.expires_at)
            .field("depth", &self.depth())
            .finish()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

impl Eq for Token {}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Token::decode(&text).map_err(serde::de::Error::custom)
    }
}

fn fresh_nonce() -> String {
    let mut nonce = [0u8; TOKEN_NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);
    hex::encode(nonce)
}

fn expiry(now: i64, ttl_secs: u64) -> i64 {
    now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
}

/// Issue a self-signed root token: issuer, audience and subject are all
/// `identity`.
pub fn issue_root(
    identity: &Keypair,
    command: Command,
    ttl_secs: u64,
    clock: &dyn Clock,
) -> Result<Token, TokenError> {
    let did = identity.did();
    let now = clock.now();
    let payload = TokenPayload {
        issuer: did.clone(),
        audience: did.clone(),
        subject: did,
        command,
        expires_at: expiry(now, ttl_secs),
        issued_at: now,
        nonce: fresh_nonce(),
        body: TokenBody::Delegation {
            constraints: Constraints::new(),
        },
        proof: None,
    };
    Token::sign(payload, identity, None)
}

/// Delegate a narrower capability from `parent` to `audience`.
pub fn delegate(
    parent: &Token,
    command: Command,
    audience: &Did,
    ttl_secs: u64,
    signer: &Keypair,
    clock: &dyn Clock,
    constraints: Constraints,
) -> Result<Token, TokenError> {
    extend_chain(
        parent,
        command,
        audience,
        ttl_secs,
        signer,
        clock,
        TokenBody::Delegation { constraints },
    )
}

/// Exercise `parent`. Invocations can't be extended further.
pub fn invoke(
    parent: &Token,
    command: Command,
    audience: &Did,
    ttl_secs: u64,
    signer: &Keypair,
    clock: &dyn Clock,
    arguments: Constraints,
) -> Result<Token, TokenError> {
    extend_chain(
        parent,
        command,
        audience,
        ttl_secs,
        signer,
        clock,
        TokenBody::Invocation { arguments },
    )
}

fn extend_chain(
    parent: &Token,
    command: Command,
    audience: &Did,
    ttl_secs: u64,
    signer: &Keypair,
    clock: &dyn Clock,
    body: TokenBody,
) -> Result<Token, TokenError> {
    if parent.is_invocation() {
        return Err(TokenError::TerminalParent);
    }

    let signer_did = signer.did();
    if &signer_did != parent.audience() {
        return Err(TokenError::NotParentAudience {
            signer: signer_did.to_string(),
            audience: parent.audience().to_string(),
        });
    }

    let now = clock.now();
    if parent.expires_at() <= now {
        return Err(TokenError::Expired {
            expired_at: parent.expires_at(),
            now,
        });
    }

    if !parent.command().covers(&command) {
        return Err(TokenError::CommandNotSubset {
            parent: parent.command().to_string(),
            child: command.to_string(),
        });
    }

    let expires_at = expiry(now, ttl_secs);
    if expires_at > parent.expires_at() {
        return Err(TokenError::ExpiryExceedsParent {
            parent: parent.expires_at(),
            child: expires_at,
        });
    }

    if parent.depth() + 1 > MAX_CHAIN_DEPTH {
        return Err(TokenError::ChainTooDeep(MAX_CHAIN_DEPTH));
    }

    if let TokenBody::Delegation { constraints } = &body {
        check_constraints_narrow(&parent.effective_constraints(), constraints)?;
    }

    let payload = TokenPayload {
        issuer: signer_did,
        audience: audience.clone(),
        subject: parent.subject().clone(),
        command,
        expires_at,
        issued_at: now,
        nonce: fresh_nonce(),
        body,
        proof: Some(parent.hash()),
    };
    Token::sign(payload, signer, Some(Arc::new(parent.clone())))
}

fn check_constraints_narrow(inherited: &Constraints, added: &Constraints) -> Result<(), TokenError> {
    for (key, value) in added {
        if let Some(existing) = inherited.get(key) {
            if existing != value {
                return Err(TokenError::ChainInvalid(format!(
                    "constraint {key:?} changes an inherited value"
                )));
            }
        }
    }
    Ok(())
}

/// Builder over [`delegate`] and [`invoke`].
///
/// ```
/// use custody_envelope::{issue_root, Command, FixedClock, Keypair};
///
/// let clock = FixedClock::new(1_700_000_000);
/// let builder = Keypair::generate();
/// let user = Keypair::generate();
/// let root = issue_root(&builder, Command::parse("/nil/db").unwrap(), 7200, &clock).unwrap();
///
/// let token = root
///     .extend()
///     .command(Command::parse("/nil/db/data/create").unwrap())
///     .audience(user.did())
///     .ttl(3600)
///     .delegate(&builder, &clock)
///     .unwrap();
/// assert_eq!(token.audience(), &user.did());
/// ```
pub struct TokenBuilder<'a> {
    parent: &'a Token,
    command: Command,
    audience: Option<Did>,
    ttl_secs: u64,
    entries: Constraints,
}

impl<'a> TokenBuilder<'a> {
    fn new(parent: &'a Token) -> Self {
        Self {
            parent,
            command: parent.command().clone(),
            audience: None,
            ttl_secs: 0,
            entries: Constraints::new(),
        }
    }

    pub fn command(mut self, command: Command) -> Self {
        self.command = command;
        self
    }

    pub fn audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    pub fn ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Constraint on a delegation, argument on an invocation.
    pub fn entry(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn delegate(self, signer: &Keypair, clock: &dyn Clock) -> Result<Token, TokenError> {
        let audience = self.require_audience()?;
        delegate(self.parent, self.command, &audience, self.ttl_secs, signer, clock, self.entries)
    }

    pub fn invoke(self, signer: &Keypair, clock: &dyn Clock) -> Result<Token, TokenError> {
        let audience = self.require_audience()?;
        invoke(self.parent, self.command, &audience, self.ttl_secs, signer, clock, self.entries)
    }

    fn require_audience(&self) -> Result<Did, TokenError> {
        self.audience
            .clone()
            .ok_or_else(|| TokenError::Malformed("audience not set".into()))
    }
}

/// What a verified chain grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedChain {
    /// Trusted root issuer.
    pub root: Did,
    pub subject: Did,
    /// Who may act on the chain: the leaf audience for a delegation, the
    /// invoker for an invocation.
    pub holder: Did,
    pub audience: Did,
    pub command: Command,
    /// Earliest expiry along the chain.
    pub expires_at: i64,
    pub depth: usize,
    pub constraints: Constraints,
    pub arguments: Option<Constraints>,
}

impl VerifiedChain {
    pub fn constraint(&self, key: &str) -> Option<&serde_json::Value> {
        self.constraints.get(key)
    }

    pub fn constraint_str(&self, key: &str) -> Option<&str> {
        self.constraint(key).and_then(serde_json::Value::as_str)
    }
}

/// Verify the whole chain ending at `token`.
///
/// Structural and signature failures are reported first, then an untrusted
/// root, then expiry.
pub fn verify(token: &Token, trusted_roots: &[Did], now: i64) -> Result<VerifiedChain, TokenError> {
    let links = token.links();
    if links.len() > MAX_CHAIN_DEPTH + 1 {
        return Err(TokenError::ChainInvalid(format!(
            "{} links exceeds depth limit {}",
            links.len(),
            MAX_CHAIN_DEPTH
        )));
    }

    for (i, link) in links.iter().enumerate() {
        link.issuer().verify(&link.raw_payload, &link.signature)?;

        if i > 0 && link.is_invocation() {
            return Err(TokenError::ChainInvalid("invocation is not the leaf".into()));
        }

        let Some(parent) = link.parent.as_deref() else {
            if link.proof().is_some() {
                return Err(TokenError::ChainInvalid("root carries a proof".into()));
            }
            continue;
        };

        if link.proof() != Some(parent.hash().as_str()) {
            return Err(TokenError::ChainInvalid(format!("proof mismatch at depth {}", links.len() - 1 - i)));
        }
        if link.issuer() != parent.audience() {
            return Err(TokenError::ChainInvalid(format!(
                "issuer {} is not the audience of its parent",
                link.issuer()
            )));
        }
        if link.subject() != parent.subject() {
            return Err(TokenError::ChainInvalid("subject changed along the chain".into()));
        }
        if !parent.command().covers(link.command()) {
            return Err(TokenError::ChainInvalid(format!(
                "command {} widens {}",
                link.command(),
                parent.command()
            )));
        }
        if link.expires_at() > parent.expires_at() {
            return Err(TokenError::ChainInvalid("expiry later than parent".into()));
        }
        if let TokenBody::Delegation { constraints } = link.body() {
            check_constraints_narrow(&parent.effective_constraints(), constraints)?;
        }
    }

    let root = links[links.len() - 1];
    if root.issuer() != root.audience() || root.issuer() != root.subject() {
        return Err(TokenError::UntrustedRoot(root.issuer().to_string()));
    }
    if !trusted_roots.contains(root.issuer()) {
        return Err(TokenError::UntrustedRoot(root.issuer().to_string()));
    }

    for link in &links {
        if link.expires_at() <= now {
            return Err(TokenError::Expired {
                expired_at: link.expires_at(),
                now,
            });
        }
    }

    let arguments = match token.body() {
        TokenBody::Invocation { arguments } => Some(arguments.clone()),
        TokenBody::Delegation { .. } => None,
    };
    let holder = if token.is_invocation() {
        token.issuer().clone()
    } else {
        token.audience().clone()
    };

    Ok(VerifiedChain {
        root: root.issuer().clone(),
        subject: token.subject().clone(),
        holder,
        audience: token.audience().clone(),
        command: token.command().clone(),
        expires_at: links.iter().map(|l| l.expires_at()).min().unwrap_or(i64::MIN),
        depth: links.len() - 1,
        constraints: token.effective_constraints(),
        arguments,
    })
}
