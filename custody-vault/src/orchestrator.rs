//! The encrypt, store and recover pipeline.
//!
//! A run draws a fresh secret, hands it to key custody under a user identity
//! derived from that secret, seals the content with a key derived from the
//! same secret and stores the envelope. The receipt's token is all a caller
//! needs to get the plaintext back.

use std::path::Path;
use std::sync::Arc;

use custody_envelope::{
    delegate, derive, issue_root, open, seal, verify, Clock, Command, Constraints, Did, Keypair,
    Secret, Token, TokenError, VerifiedChain,
};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::audit::{AuditAction, AuditEvent, AuditSinkSync};
use crate::config::COLLECTION_ID;
use crate::content::ContentStore;
use crate::custody::{KeyCustody, CREATE_DATA_COMMAND, DOCUMENT_CONSTRAINT, NAMESPACE_CONSTRAINT};
use crate::error::{ConfigError, CustodyError, VaultError};
use crate::policy::{evaluate, TokenPolicy, TokenVerdict};
use crate::types::{
    Acl, ContentId, CustodyReceipt, DocumentId, NamespaceId, NamespaceSpec, NamespaceStatus,
    StoreShare,
};

/// Name given to a namespace created on first run.
pub const DEFAULT_NAMESPACE_NAME: &str = "custody-keys";

/// Who the orchestrator acts as and under which limits.
pub struct CustodyContext {
    pub builder: Keypair,
    /// Command granted by the root token.
    pub root_command: Command,
    /// Namespace for user shares. `None` until bootstrap has created one.
    pub namespace: Option<NamespaceId>,
    pub policy: TokenPolicy,
}

pub struct CustodyOrchestrator {
    builder: Keypair,
    root_command: Command,
    policy: TokenPolicy,
    root: RwLock<Token>,
    namespace: RwLock<Option<NamespaceId>>,
    custody: Arc<dyn KeyCustody>,
    content: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSinkSync>,
}

impl CustodyOrchestrator {
    /// Issues the builder's root token right away.
    pub fn new(
        ctx: CustodyContext,
        custody: Arc<dyn KeyCustody>,
        content: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSinkSync>,
    ) -> Result<Self, VaultError> {
        let root = issue_root(
            &ctx.builder,
            ctx.root_command.clone(),
            ctx.policy.root_ttl.as_secs(),
            clock.as_ref(),
        )?;
        tracing::info!(builder = %ctx.builder.did(), expires_at = root.expires_at(), "root token issued");
        audit.record(
            AuditEvent::new(AuditAction::RootTokenIssued {
                expires_at: root.expires_at(),
            })
            .with_actor(ctx.builder.did().to_string()),
        );

        Ok(Self {
            builder: ctx.builder,
            root_command: ctx.root_command,
            policy: ctx.policy,
            root: RwLock::new(root),
            namespace: RwLock::new(ctx.namespace),
            custody,
            content,
            clock,
            audit,
        })
    }

    pub fn builder_did(&self) -> Did {
        self.builder.did()
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    pub async fn namespace(&self) -> Option<NamespaceId> {
        *self.namespace.read().await
    }

    pub async fn root_token(&self) -> Token {
        self.root.read().await.clone()
    }

    /// Replace the root token with a freshly issued one.
    pub async fn refresh_root_token(&self) -> Result<Token, VaultError> {
        let root = issue_root(
            &self.builder,
            self.root_command.clone(),
            self.policy.root_ttl.as_secs(),
            self.clock.as_ref(),
        )?;
        *self.root.write().await = root.clone();
        tracing::info!(expires_at = root.expires_at(), "root token refreshed");
        self.audit.record(
            AuditEvent::new(AuditAction::RootTokenIssued {
                expires_at: root.expires_at(),
            })
            .with_actor(self.builder.did().to_string()),
        );
        Ok(root)
    }

    /// The root token, reissued first if the policy asks for it.
    async fn current_root(&self) -> Result<Token, VaultError> {
        let root = self.root_token().await;
        match evaluate(&self.policy, &root, self.clock.now()) {
            TokenVerdict::Fresh => Ok(root),
            TokenVerdict::Warning { reason } => {
                tracing::warn!(%reason, "root token nearing expiry");
                Ok(root)
            }
            TokenVerdict::RefreshNeeded { reason } => {
                tracing::info!(%reason, "refreshing root token");
                self.refresh_root_token().await
            }
        }
    }

    /// Check the configured namespace belongs to the builder, or create one
    /// when none is configured.
    pub async fn ensure_namespace(&self) -> Result<NamespaceStatus, VaultError> {
        let root = self.current_root().await?;
        let configured = *self.namespace.read().await;

        if let Some(id) = configured {
            let owned = self.custody.namespaces_of(&self.builder.did()).await?;
            if !owned.contains(&id) {
                return Err(CustodyError::NamespaceNotRegistered(id).into());
            }
            self.audit.record(
                AuditEvent::new(AuditAction::NamespaceVerified)
                    .with_namespace(id)
                    .with_actor(self.builder.did().to_string()),
            );
            return Ok(NamespaceStatus::Ready(id));
        }

        let id = self
            .custody
            .create_namespace(&root, NamespaceSpec::secret_keys(DEFAULT_NAMESPACE_NAME))
            .await?;
        *self.namespace.write().await = Some(id);
        tracing::info!(namespace = %id, "created namespace; save it as {}", COLLECTION_ID);
        Ok(NamespaceStatus::Created(id))
    }

    /// Delegate part of the root token to `audience`.
    pub async fn issue_delegation(
        &self,
        audience: &Did,
        command: Command,
        constraints: Constraints,
    ) -> Result<Token, VaultError> {
        let root = self.current_root().await?;
        let token = delegate(
            &root,
            command,
            audience,
            self.policy.delegation_ttl.as_secs(),
            &self.builder,
            self.clock.as_ref(),
            constraints,
        )?;
        tracing::debug!(audience = %audience, command = %token.command(), expires_at = token.expires_at(), "delegation issued");
        self.audit.record(
            AuditEvent::new(AuditAction::DelegationIssued {
                audience: audience.to_string(),
                command: token.command().to_string(),
            })
            .with_actor(self.builder.did().to_string()),
        );
        Ok(token)
    }

    /// Verify a chain against the builder as the only trusted root.
    pub fn verify_token(&self, token: &Token) -> Result<VerifiedChain, VaultError> {
        match verify(token, &[self.builder.did()], self.clock.now()) {
            Ok(chain) => {
                self.audit.record(
                    AuditEvent::new(AuditAction::TokenVerified).with_actor(chain.holder.to_string()),
                );
                Ok(chain)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token rejected");
                self.audit.record(
                    AuditEvent::new(AuditAction::TokenRejected { reason: e.to_string() })
                        .with_actor(token.audience().to_string())
                        .with_failure(),
                );
                Err(e.into())
            }
        }
    }

    pub async fn encrypt_and_store(&self, path: impl AsRef<Path>) -> Result<CustodyReceipt, VaultError> {
        let plaintext = Zeroizing::new(tokio::fs::read(path.as_ref()).await?);
        tracing::debug!(path = %path.as_ref().display(), bytes = plaintext.len(), "read input");
        self.encrypt_bytes_and_store(&plaintext).await
    }

    pub async fn encrypt_bytes_and_store(&self, plaintext: &[u8]) -> Result<CustodyReceipt, VaultError> {
        let namespace = self
            .namespace()
            .await
            .ok_or(ConfigError::Missing(COLLECTION_ID))?;

        let secret = Secret::generate();
        let user = Keypair::from_secret(&secret)?;
        let user_did = user.did();
        let document = DocumentId::generate();

        let mut constraints = Constraints::new();
        constraints.insert(NAMESPACE_CONSTRAINT.into(), namespace.to_string().into());
        constraints.insert(DOCUMENT_CONSTRAINT.into(), document.to_string().into());
        let grant = self
            .issue_delegation(&user_did, Command::parse(CREATE_DATA_COMMAND)?, constraints)
            .await?;
        // Custody only honours the user's own signature on share access.
        let remaining = (grant.expires_at() - self.clock.now()).max(0) as u64;
        let token = grant
            .extend()
            .audience(self.builder.did())
            .ttl(remaining)
            .invoke(&user, self.clock.as_ref())?;

        self.custody
            .store_share(
                &token,
                StoreShare {
                    owner: user_did.clone(),
                    acl: Acl::execute_only(self.builder.did()),
                    namespace,
                    document,
                    data: Zeroizing::new(secret.as_bytes().to_vec()),
                },
            )
            .await?;

        let stored = self.custody.read_share(&token, &namespace, &document).await?;
        if !bool::from(stored.as_slice().ct_eq(secret.as_bytes())) {
            return Err(CustodyError::ShareMismatch.into());
        }
        self.audit.record(
            AuditEvent::new(AuditAction::ShareVerified)
                .with_namespace(namespace)
                .with_document(document)
                .with_actor(user_did.to_string()),
        );

        let key = derive(&secret)?;
        let envelope = seal(plaintext, &key)?;
        let content_id = self.content.put(&envelope).await?;
        tracing::info!(content_id = %content_id, namespace = %namespace, document = %document, bytes = envelope.len(), "content sealed and stored");
        self.audit.record(
            AuditEvent::new(AuditAction::ContentStored { bytes: envelope.len() })
                .with_namespace(namespace)
                .with_document(document)
                .with_content(content_id.clone())
                .with_actor(user_did.to_string()),
        );

        Ok(CustodyReceipt {
            content_id,
            token,
            namespace,
            document,
            user_did,
        })
    }

    /// Recover plaintext with the token from a receipt. The namespace and
    /// document come from the token's constraints.
    pub async fn fetch_and_decrypt(&self, content_id: &ContentId, token: &Token) -> Result<Vec<u8>, VaultError> {
        let chain = self.verify_token(token)?;
        let namespace: NamespaceId = scoped(&chain, NAMESPACE_CONSTRAINT)?;
        let document: DocumentId = scoped(&chain, DOCUMENT_CONSTRAINT)?;

        let envelope = self.content.get(content_id).await?;
        self.audit.record(
            AuditEvent::new(AuditAction::ContentFetched { bytes: envelope.len() })
                .with_content(content_id.clone())
                .with_actor(chain.holder.to_string()),
        );

        let share = self.custody.read_share(token, &namespace, &document).await?;
        let secret = Secret::from_bytes(&share)?;
        let key = derive(&secret)?;
        let plaintext = match open(&envelope, &key) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(content_id = %content_id, error = %e, "decryption failed");
                self.audit.record(
                    AuditEvent::new(AuditAction::DecryptionFailed)
                        .with_namespace(namespace)
                        .with_document(document)
                        .with_content(content_id.clone())
                        .with_actor(chain.holder.to_string())
                        .with_failure(),
                );
                return Err(e.into());
            }
        };

        self.audit.record(
            AuditEvent::new(AuditAction::ContentDecrypted)
                .with_namespace(namespace)
                .with_document(document)
                .with_content(content_id.clone())
                .with_actor(chain.holder.to_string()),
        );
        Ok(plaintext)
    }

    /// [`Self::fetch_and_decrypt`], then write the plaintext to `path`.
    /// Returns the number of bytes written.
    pub async fn fetch_and_decrypt_to(
        &self,
        content_id: &ContentId,
        token: &Token,
        path: impl AsRef<Path>,
    ) -> Result<usize, VaultError> {
        let plaintext = Zeroizing::new(self.fetch_and_decrypt(content_id, token).await?);
        tokio::fs::write(path.as_ref(), plaintext.as_slice()).await?;
        tracing::info!(path = %path.as_ref().display(), bytes = plaintext.len(), "plaintext written");
        Ok(plaintext.len())
    }
}

fn scoped<T: std::str::FromStr>(chain: &VerifiedChain, key: &str) -> Result<T, TokenError>
where
    T::Err: std::fmt::Display,
{
    let value = chain
        .constraint_str(key)
        .ok_or_else(|| TokenError::Malformed(format!("token carries no {key}")))?;
    value
        .parse()
        .map_err(|e: T::Err| TokenError::Malformed(format!("{key} {value:?}: {e}")))
}
