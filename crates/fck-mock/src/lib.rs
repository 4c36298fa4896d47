//! fck-mock
//!
//! Reference mock collaborator implementations used for local development,
//! the kernel's own integration tests, and `fck-cli`'s default wiring: one
//! small, honest stand-in per trait, never wired up by default in a
//! production deployment.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use fck_core::{AssistanceRoute, CanonicalActionFrame, UpdatePackage};
use fck_kernel::{
    AssistanceBroker, AssistanceRequestParams, AssistanceResponse, AttestationClient,
    AttestationDecision, AttestationVerdict, BundleApplier, FederationClient, FederationRequest,
    FederationResponse, GovernanceDecision, GovernanceGate, SignatureVerifier, StorageAdapter,
};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// A `GovernanceGate` that allows every action unconditionally.
///
/// Useful for exercising the kernel's other phases without a real policy
/// corpus wired up; never use this outside tests or local development.
#[derive(Debug, Clone, Default)]
pub struct AllowAllGovernanceGate;

#[async_trait]
impl GovernanceGate for AllowAllGovernanceGate {
    async fn evaluate(&self, _frame: &CanonicalActionFrame) -> GovernanceDecision {
        GovernanceDecision::allow()
    }
}

/// An `AttestationClient` that always attests, returning the frame's own
/// canonical hash as a stand-in `uva_hash`.
#[derive(Debug, Clone, Default)]
pub struct AlwaysAttestClient;

#[async_trait]
impl AttestationClient for AlwaysAttestClient {
    async fn attest(&self, frame: &CanonicalActionFrame) -> AttestationDecision {
        let uva_hash = frame.canonical_hash().ok();
        AttestationDecision { verdict: AttestationVerdict::Attested, uva_hash, reason: None }
    }
}

/// A `FederationClient` that echoes the request payload back as the result,
/// tagged with a fixed mock source identifier.
#[derive(Debug, Clone, Default)]
pub struct EchoFederationClient;

#[async_trait]
impl FederationClient for EchoFederationClient {
    async fn request(&self, req: FederationRequest) -> FederationResponse {
        FederationResponse {
            ok: true,
            result: Some(serde_json::json!({ "echo": req.payload, "operation": req.operation })),
            error: None,
            source: Some("mock-federation".to_string()),
        }
    }
}

/// An `AssistanceBroker` that never produces a usable response. Useful as a
/// baseline for exercising `ASSISTANCE_DISABLED` and bounded-assistance
/// paths without a real broker.
#[derive(Debug, Clone, Default)]
pub struct NullAssistanceBroker;

#[async_trait]
impl AssistanceBroker for NullAssistanceBroker {
    async fn request_assistance(&self, _req: AssistanceRequestParams) -> AssistanceResponse {
        AssistanceResponse { ok: false, response: None, route_used: None, error: Some("no broker configured".to_string()) }
    }
}

/// An `AssistanceBroker` that always escalates to a human and reports success.
#[derive(Debug, Clone, Default)]
pub struct AlwaysEscalateAssistanceBroker;

#[async_trait]
impl AssistanceBroker for AlwaysEscalateAssistanceBroker {
    async fn request_assistance(&self, req: AssistanceRequestParams) -> AssistanceResponse {
        AssistanceResponse {
            ok: true,
            response: Some(serde_json::json!({ "escalated_query": req.query })),
            route_used: Some(AssistanceRoute::HumanEscalation),
            error: None,
        }
    }
}

/// An in-process, non-durable `StorageAdapter` backed by a `BTreeMap`.
///
/// Lives only as long as the process; use `fck-storage-file` for anything
/// that must survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl StorageAdapter for InMemoryStorage {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A `SignatureVerifier` that accepts every package unconditionally.
#[derive(Debug, Clone, Default)]
pub struct AcceptAllSignatureVerifier;

#[async_trait]
impl SignatureVerifier for AcceptAllSignatureVerifier {
    async fn verify(&self, _package: &UpdatePackage, _trusted_signers: &[String]) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// A `SignatureVerifier` that trusts a package only if `signer_id` appears
/// in the caller-supplied `trusted_signers` list — no cryptography, just the
/// shape of the check a real verifier would perform.
#[derive(Debug, Clone, Default)]
pub struct SignerAllowlistVerifier;

#[async_trait]
impl SignatureVerifier for SignerAllowlistVerifier {
    async fn verify(&self, package: &UpdatePackage, trusted_signers: &[String]) -> anyhow::Result<bool> {
        Ok(package
            .signer_id
            .as_deref()
            .is_some_and(|signer| trusted_signers.iter().any(|t| t == signer)))
    }
}

/// A `BundleApplier` that performs no integration work and always succeeds.
#[derive(Debug, Clone, Default)]
pub struct NoopBundleApplier;

#[async_trait]
impl BundleApplier for NoopBundleApplier {
    async fn apply(&self, _package: &UpdatePackage) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A `BundleApplier` that always fails, for exercising the
/// "`last_manifest_hash` must be left untouched on apply failure" invariant.
#[derive(Debug, Clone)]
pub struct FailingBundleApplier(pub &'static str);

#[async_trait]
impl BundleApplier for FailingBundleApplier {
    async fn apply(&self, _package: &UpdatePackage) -> anyhow::Result<()> {
        anyhow::bail!("{}", self.0)
    }
}
