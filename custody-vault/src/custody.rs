//! Key custody: token-gated share storage split across nodes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use custody_envelope::{verify, Clock, Command, Did, Token, VerifiedChain};
use zeroize::Zeroizing;

use crate::audit::{AuditAction, AuditEvent, AuditSinkSync};
use crate::error::CustodyError;
use crate::share;
use crate::storage::{InMemoryShareBackend, ShareBackend};
use crate::types::{DocumentId, NamespaceId, NamespaceRecord, NamespaceSpec, ShareRecord, StoreShare};

/// Everything under the data API.
pub const DATA_COMMAND: &str = "/nil/db/data";
/// Store a document.
pub const CREATE_DATA_COMMAND: &str = "/nil/db/data/create";
/// Read a document.
pub const READ_DATA_COMMAND: &str = "/nil/db/data/read";
/// Create a namespace.
pub const CREATE_NAMESPACE_COMMAND: &str = "/nil/db/collections/create";

/// Token constraint naming the only namespace a chain may touch.
pub const NAMESPACE_CONSTRAINT: &str = "namespace";
/// Token constraint naming the only document a chain may touch.
pub const DOCUMENT_CONSTRAINT: &str = "document";

/// A key-custody service. Every call is authorized by a capability token.
///
/// Share reads and writes take an invocation: the holder is the invoker,
/// whose signature proves it holds the key and not just the name.
#[async_trait]
pub trait KeyCustody: Send + Sync {
    async fn create_namespace(&self, token: &Token, spec: NamespaceSpec) -> Result<NamespaceId, CustodyError>;

    /// Namespaces owned by `did`.
    async fn namespaces_of(&self, did: &Did) -> Result<Vec<NamespaceId>, CustodyError>;

    async fn store_share(&self, token: &Token, share: StoreShare) -> Result<(), CustodyError>;

    async fn read_share(
        &self,
        token: &Token,
        namespace: &NamespaceId,
        document: &DocumentId,
    ) -> Result<Zeroizing<Vec<u8>>, CustodyError>;
}

/// Custody over local nodes. Each secret is XOR-split so that every node
/// holds one share and no node alone learns anything.
pub struct LocalCustody {
    nodes: Vec<Arc<dyn ShareBackend>>,
    trusted_roots: Vec<Did>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSinkSync>,
}

impl LocalCustody {
    pub fn new(
        nodes: Vec<Arc<dyn ShareBackend>>,
        trusted_roots: Vec<Did>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSinkSync>,
    ) -> Result<Self, CustodyError> {
        if nodes.is_empty() {
            return Err(CustodyError::Backend("custody needs at least one node".into()));
        }
        Ok(Self {
            nodes,
            trusted_roots,
            clock,
            audit,
        })
    }

    /// `count` fresh in-memory nodes.
    pub fn in_memory(
        count: usize,
        trusted_roots: Vec<Did>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSinkSync>,
    ) -> Result<Self, CustodyError> {
        let nodes = (0..count)
            .map(|_| Arc::new(InMemoryShareBackend::new()) as Arc<dyn ShareBackend>)
            .collect();
        Self::new(nodes, trusted_roots, clock, audit)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn primary(&self) -> &Arc<dyn ShareBackend> {
        // `new` guarantees at least one node.
        &self.nodes[0]
    }

    fn authorize(&self, token: &Token) -> Result<VerifiedChain, CustodyError> {
        match verify(token, &self.trusted_roots, self.clock.now()) {
            Ok(chain) => Ok(chain),
            Err(e) => {
                self.audit.record(
                    AuditEvent::new(AuditAction::TokenRejected { reason: e.to_string() })
                        .with_actor(token.audience().to_string())
                        .with_failure(),
                );
                Err(e.into())
            }
        }
    }

    /// Load `namespace`, which must belong to the chain's subject.
    fn owned_namespace(&self, chain: &VerifiedChain, namespace: &NamespaceId) -> Result<(), CustodyError> {
        let record = self
            .primary()
            .get_namespace(namespace)?
            .ok_or(CustodyError::NamespaceNotFound(*namespace))?;
        if record.owner != chain.subject {
            return Err(CustodyError::PermissionDenied(format!(
                "namespace {} is not owned by {}",
                record.id, chain.subject
            )));
        }
        Ok(())
    }

    fn deny(&self, chain: &VerifiedChain, namespace: NamespaceId, reason: String) -> CustodyError {
        self.audit.record(
            AuditEvent::new(AuditAction::ShareReadDenied { reason: reason.clone() })
                .with_namespace(namespace)
                .with_actor(chain.holder.to_string())
                .with_failure(),
        );
        CustodyError::PermissionDenied(reason)
    }
}

fn command(text: &str) -> Result<Command, CustodyError> {
    Command::parse(text).map_err(CustodyError::Unauthorized)
}

/// A delegation only names its audience. An invocation is signed by the
/// holder itself.
fn require_invocation(chain: &VerifiedChain) -> Result<(), String> {
    if chain.arguments.is_none() {
        return Err(format!(
            "share access needs an invocation signed by {}, not a delegation",
            chain.holder
        ));
    }
    Ok(())
}

/// Namespace and document constraints carried by the chain must match the
/// request.
fn check_scope(
    chain: &VerifiedChain,
    namespace: &NamespaceId,
    document: &DocumentId,
) -> Result<(), String> {
    if let Some(ns) = chain.constraint_str(NAMESPACE_CONSTRAINT) {
        if ns != namespace.to_string() {
            return Err(format!("token is scoped to namespace {ns}"));
        }
    }
    if let Some(doc) = chain.constraint_str(DOCUMENT_CONSTRAINT) {
        if doc != document.to_string() {
            return Err(format!("token is scoped to document {doc}"));
        }
    }
    Ok(())
}

#[async_trait]
impl KeyCustody for LocalCustody {
    async fn create_namespace(&self, token: &Token, spec: NamespaceSpec) -> Result<NamespaceId, CustodyError> {
        let chain = self.authorize(token)?;
        if !chain.command.covers(&command(CREATE_NAMESPACE_COMMAND)?) {
            return Err(CustodyError::PermissionDenied(format!(
                "{} does not cover {}",
                chain.command, CREATE_NAMESPACE_COMMAND
            )));
        }
        if chain.holder != chain.root {
            return Err(CustodyError::PermissionDenied(
                "only the root identity may create namespaces".into(),
            ));
        }

        let record = NamespaceRecord {
            id: NamespaceId::generate(),
            name: spec.name,
            owner: chain.holder.clone(),
            schema: spec.schema,
            created_at: Utc::now(),
        };
        for node in &self.nodes {
            node.put_namespace(&record)?;
        }

        tracing::info!(namespace = %record.id, owner = %record.owner, "namespace created");
        self.audit.record(
            AuditEvent::new(AuditAction::NamespaceCreated)
                .with_namespace(record.id)
                .with_actor(record.owner.to_string())
                .with_detail(record.name.clone()),
        );
        Ok(record.id)
    }

    async fn namespaces_of(&self, did: &Did) -> Result<Vec<NamespaceId>, CustodyError> {
        let mut ids: Vec<NamespaceId> = self
            .primary()
            .list_namespaces()?
            .into_iter()
            .filter(|ns| &ns.owner == did)
            .map(|ns| ns.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn store_share(&self, token: &Token, share: StoreShare) -> Result<(), CustodyError> {
        let chain = self.authorize(token)?;
        if !chain.command.covers(&command(CREATE_DATA_COMMAND)?) {
            return Err(CustodyError::PermissionDenied(format!(
                "{} does not cover {}",
                chain.command, CREATE_DATA_COMMAND
            )));
        }
        require_invocation(&chain).map_err(CustodyError::PermissionDenied)?;
        if chain.holder != share.owner {
            return Err(CustodyError::PermissionDenied(format!(
                "token holder {} is not the share owner {}",
                chain.holder, share.owner
            )));
        }
        check_scope(&chain, &share.namespace, &share.document).map_err(CustodyError::PermissionDenied)?;

        self.owned_namespace(&chain, &share.namespace)?;

        for node in &self.nodes {
            if node.get_share(&share.namespace, &share.document)?.is_some() {
                return Err(CustodyError::DuplicateDocument {
                    namespace: share.namespace,
                    document: share.document,
                });
            }
        }

        let parts = share::split(&share.data, self.nodes.len())?;
        let created_at = Utc::now();
        for (node, part) in self.nodes.iter().zip(parts.iter()) {
            node.put_share(&ShareRecord {
                namespace: share.namespace,
                document: share.document,
                owner: share.owner.clone(),
                acl: vec![share.acl.clone()],
                share_hex: hex::encode(part.as_slice()),
                created_at,
            })?;
        }

        tracing::debug!(namespace = %share.namespace, document = %share.document, nodes = self.nodes.len(), "share stored");
        self.audit.record(
            AuditEvent::new(AuditAction::ShareStored { nodes: self.nodes.len() })
                .with_namespace(share.namespace)
                .with_document(share.document)
                .with_actor(chain.holder.to_string()),
        );
        Ok(())
    }

    async fn read_share(
        &self,
        token: &Token,
        namespace: &NamespaceId,
        document: &DocumentId,
    ) -> Result<Zeroizing<Vec<u8>>, CustodyError> {
        let chain = self.authorize(token)?;
        let data = command(DATA_COMMAND)?;
        if !(data.covers(&chain.command) || chain.command.covers(&command(READ_DATA_COMMAND)?)) {
            let reason = format!("{} is outside {}", chain.command, DATA_COMMAND);
            return Err(self.deny(&chain, *namespace, reason));
        }
        require_invocation(&chain).map_err(|reason| self.deny(&chain, *namespace, reason))?;
        check_scope(&chain, namespace, document).map_err(|reason| self.deny(&chain, *namespace, reason))?;
        self.owned_namespace(&chain, namespace).map_err(|e| match e {
            CustodyError::PermissionDenied(reason) => self.deny(&chain, *namespace, reason),
            other => other,
        })?;

        let mut parts = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            let record = match node.get_share(namespace, document)? {
                Some(record) => record,
                None if i == 0 => {
                    return Err(CustodyError::DocumentNotFound {
                        namespace: *namespace,
                        document: *document,
                    })
                }
                None => return Err(CustodyError::Backend(format!("node {i} is missing its share"))),
            };
            if i == 0 && !record.can_read(&chain.holder) {
                let reason = format!("{} has no read access", chain.holder);
                return Err(self.deny(&chain, *namespace, reason));
            }
            let part = hex::decode(&record.share_hex)
                .map_err(|e| CustodyError::Backend(format!("node {i} share encoding: {e}")))?;
            parts.push(Zeroizing::new(part));
        }

        let secret = share::combine(&parts)?;
        self.audit.record(
            AuditEvent::new(AuditAction::ShareRead)
                .with_namespace(*namespace)
                .with_document(*document)
                .with_actor(chain.holder.to_string()),
        );
        Ok(secret)
    }
}
