//! fck-kernel
//!
//! The policy-gated execution core of the Federated Capability Kernel.
//!
//! [`FederatedCapabilityKernel`] mediates every outbound action a satellite
//! agent performs — remote federation calls, assistance requests, and
//! update-package application — through the same five-phase pipeline:
//! manifest-gate, frame construction, governance evaluation, conditional
//! attestation, effect. The kernel never transports bytes, evaluates policy,
//! attests, verifies signatures, or applies update bundles itself; those are
//! delegated to the collaborator traits below.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::Utc;
use fck_core::{
    canonical_json, sha256_hex_prefix12, AssistanceRoute, CanonicalActionFrame, CapabilityManifest,
    PersistedKernelState, RiskTier, UpdateChannel, UpdatePackage,
};
use fck_error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Collaborator contracts (§6)
// ---------------------------------------------------------------------------

/// Verdict returned by a [`GovernanceGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceVerdict {
    /// The action is permitted.
    Allow,
    /// The action is refused.
    Deny,
}

/// Result of evaluating a frame against governance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceDecision {
    /// ALLOW or DENY.
    pub verdict: GovernanceVerdict,
    /// Opaque reason, surfaced verbatim in the kernel's error tag.
    pub reason: Option<String>,
    /// Hash of the policy corpus that produced this verdict, if available.
    pub policy_hash: Option<String>,
}

impl GovernanceDecision {
    /// Construct an `ALLOW` decision.
    #[must_use]
    pub fn allow() -> Self {
        Self { verdict: GovernanceVerdict::Allow, reason: None, policy_hash: None }
    }

    /// Construct a `DENY` decision with the given reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { verdict: GovernanceVerdict::Deny, reason: Some(reason.into()), policy_hash: None }
    }

    /// `true` only for [`GovernanceVerdict::Allow`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self.verdict, GovernanceVerdict::Allow)
    }
}

/// Given a frame, decides ALLOW or DENY. Must be a pure function of the frame
/// plus the evaluator's own pinned policy state; must not mutate kernel state.
#[async_trait]
pub trait GovernanceGate: Send + Sync {
    /// Evaluate `frame` and return a verdict.
    async fn evaluate(&self, frame: &CanonicalActionFrame) -> GovernanceDecision;
}

/// Verdict returned by an [`AttestationClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttestationVerdict {
    /// The action was attested.
    Attested,
    /// Attestation was refused.
    Refused,
}

/// Result of submitting a frame for attestation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationDecision {
    /// ATTESTED or REFUSED.
    pub verdict: AttestationVerdict,
    /// Opaque identifier for the attested action, present only on success.
    pub uva_hash: Option<String>,
    /// Opaque refusal reason, surfaced verbatim in the kernel's error tag.
    pub reason: Option<String>,
}

/// Verification-authority collaborator. Only invoked after governance ALLOW.
#[async_trait]
pub trait AttestationClient: Send + Sync {
    /// Attest (or refuse to attest) `frame`.
    async fn attest(&self, frame: &CanonicalActionFrame) -> AttestationDecision;
}

/// Inputs to a [`FederationClient::request`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationRequest {
    /// Caller-supplied trace identifier for correlation.
    pub trace_id: String,
    /// The requesting agent.
    pub agent_id: String,
    /// The remote operation tag.
    pub operation: String,
    /// Opaque operation payload.
    pub payload: serde_json::Value,
    /// The frame's risk tier, guaranteed by the kernel to match the frame.
    pub risk_tier: RiskTier,
}

/// Response from a [`FederationClient::request`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationResponse {
    /// Whether the remote operation succeeded.
    pub ok: bool,
    /// Opaque result payload, present only on success.
    pub result: Option<serde_json::Value>,
    /// Error string, present only on failure.
    pub error: Option<String>,
    /// Identifier of the federation source that served the request.
    pub source: Option<String>,
}

/// Transport-agnostic executor of remote operations.
#[async_trait]
pub trait FederationClient: Send + Sync {
    /// Execute `req` against the federation and report the outcome.
    async fn request(&self, req: FederationRequest) -> FederationResponse;
}

/// Inputs to an [`AssistanceBroker::request_assistance`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistanceRequestParams {
    /// Caller-supplied trace identifier for correlation.
    pub trace_id: String,
    /// The requesting agent.
    pub agent_id: String,
    /// The help query text.
    pub query: String,
    /// Optional opaque context accompanying the query.
    pub context: Option<serde_json::Value>,
    /// The frame's risk tier.
    pub risk_tier: RiskTier,
}

/// Response from an [`AssistanceBroker::request_assistance`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistanceResponse {
    /// Whether the broker produced a usable response.
    pub ok: bool,
    /// Opaque response payload, present only on success.
    pub response: Option<serde_json::Value>,
    /// Which route ultimately served the request.
    pub route_used: Option<AssistanceRoute>,
    /// Error string, present only on failure.
    pub error: Option<String>,
}

/// Routes help requests to federation, peer, or human escalation.
#[async_trait]
pub trait AssistanceBroker: Send + Sync {
    /// Request assistance per `req` and report the outcome.
    async fn request_assistance(&self, req: AssistanceRequestParams) -> AssistanceResponse;
}

/// Durable key-value storage backing [`PersistedKernelState`].
///
/// Value bytes are opaque to storage; the kernel is solely responsible for
/// the canonical serialization written and read back under each key.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read the raw value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    /// Write `value` under `key`.
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Pure verifier for an [`UpdatePackage`]'s signature, injected at call time
/// because the choice of signature algorithm is policy, not kernel concern
/// (`spec.md` §4.5, §9: "function-typed arguments for the two update-time
/// callbacks"). Must not depend on kernel state.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Return `true` if `package`'s signature verifies against `trusted_signers`.
    async fn verify(&self, package: &UpdatePackage, trusted_signers: &[String]) -> anyhow::Result<bool>;
}

/// Applier for an [`UpdatePackage`]'s opaque payload, injected at call time.
/// The kernel never interprets `payload_b64`; this is the only code that may.
#[async_trait]
pub trait BundleApplier: Send + Sync {
    /// Apply `package`. An error here is a fatal update failure that leaves
    /// `last_manifest_hash` untouched.
    async fn apply(&self, package: &UpdatePackage) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Boot
// ---------------------------------------------------------------------------

/// Failure mode of [`FederatedCapabilityKernel::boot`].
///
/// `AgentIdMismatch` is the one entrypoint failure in the whole kernel
/// allowed to be fatal and non-recoverable (`spec.md` §7).
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    /// The persisted manifest's `agent_id` does not match the kernel's own.
    #[error("AGENT_ID_MISMATCH: manifest agent_id `{found}` does not match kernel agent_id `{expected}`")]
    AgentIdMismatch {
        /// The kernel's configured agent id.
        expected: String,
        /// The agent id found in the persisted manifest.
        found: String,
    },
    /// Persisted state exists but could not be parsed.
    #[error("corrupt persisted state: {0}")]
    CorruptState(String),
    /// The storage adapter failed to read or write.
    #[error("storage failure during boot: {0}")]
    Storage(#[source] anyhow::Error),
    /// The default or persisted manifest could not be canonically hashed.
    #[error(transparent)]
    Contract(#[from] fck_core::ContractError),
}

fn state_key(agent_id: &str) -> String {
    format!("acip.kernel.state.{agent_id}")
}

// ---------------------------------------------------------------------------
// Governed entrypoint request / response types
// ---------------------------------------------------------------------------

/// A uniform governed-entrypoint failure.
///
/// `error` always carries a stable tag: one of the literal kinds from
/// `spec.md` §4.7, or one of `fck-error`'s two supplemental effect-failure
/// tags (`ASSISTANCE_FAILED`, `UPDATE_APPLY_FAILED`) for effects §4.7 leaves
/// unnamed. Any of these may carry a `:<subreason>` suffix or a
/// `| assist:<route>` suffix per the bounded-assistance-on-failure
/// augmentation rule.
#[derive(Debug, Clone, Serialize)]
pub struct KernelFailure {
    /// The literal, stable error tag.
    pub error: String,
    /// Hash of the input frame, present whenever one was constructed before
    /// the failure (in particular, always present on `DVAP_REFUSED`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_frame_hash: Option<String>,
}

impl KernelFailure {
    fn tag(tag: impl Into<String>) -> Self {
        Self { error: tag.into(), input_frame_hash: None }
    }

    fn with_frame_hash(mut self, hash: impl Into<String>) -> Self {
        self.input_frame_hash = Some(hash.into());
        self
    }
}

impl std::fmt::Display for KernelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}

impl std::error::Error for KernelFailure {}

/// Input to [`FederatedCapabilityKernel::governed_federation_call`].
#[derive(Debug, Clone)]
pub struct GovernedCallRequest {
    /// Caller-supplied trace identifier for correlation.
    pub trace_id: String,
    /// The remote operation tag, checked against `federation.allowed_operations`.
    pub operation: String,
    /// Opaque operation payload.
    pub payload: serde_json::Value,
    /// The declared risk tier of the action.
    pub risk_tier: RiskTier,
}

/// Successful result of [`FederatedCapabilityKernel::governed_federation_call`].
#[derive(Debug, Clone, Serialize)]
pub struct FederationCallSuccess {
    /// The remote operation's result payload.
    pub result: serde_json::Value,
    /// Hash of the frame that was governed and (conditionally) attested.
    pub input_frame_hash: String,
    /// Attestation's verified-action hash, present only when attestation ran.
    pub uva_hash: Option<String>,
    /// Identifier of the federation source that served the request.
    pub source: Option<String>,
}

/// Input to [`FederatedCapabilityKernel::request_assistance`].
#[derive(Debug, Clone)]
pub struct AssistanceCallRequest {
    /// Caller-supplied trace identifier, folded into the content-addressed `action_id`.
    pub trace_id: String,
    /// The help query text, folded into the content-addressed `action_id`.
    pub query: String,
    /// Optional opaque context accompanying the query.
    pub context: Option<serde_json::Value>,
    /// The declared risk tier of the request.
    pub risk_tier: RiskTier,
}

/// Successful result of [`FederatedCapabilityKernel::request_assistance`].
#[derive(Debug, Clone, Serialize)]
pub struct AssistanceCallSuccess {
    /// The broker's response payload.
    pub response: serde_json::Value,
    /// Which route served the request.
    pub route_used: Option<AssistanceRoute>,
    /// Hash of the governed, content-addressed assistance frame.
    pub input_frame_hash: String,
    /// Attestation's verified-action hash, present only when attestation ran.
    pub uva_hash: Option<String>,
}

/// Successful result of [`FederatedCapabilityKernel::apply_update_package`].
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    /// The manifest hash recomputed and persisted after a successful apply.
    pub last_manifest_hash: String,
}

fn assistance_route_tag(route: AssistanceRoute) -> String {
    serde_json::to_value(route)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn update_channel_tag(channel: UpdateChannel) -> String {
    serde_json::to_value(channel)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn internal_failure(reason: impl std::fmt::Display) -> KernelFailure {
    KernelFailure::tag(format!("{}:{reason}", ErrorCode::Internal.as_str()))
}

// ---------------------------------------------------------------------------
// FederatedCapabilityKernel
// ---------------------------------------------------------------------------

/// A single stateful, policy-gated execution core for one agent.
///
/// Every collaborator is injected as an `Arc<dyn Trait>`, so a kernel can be
/// rewired with mock or production collaborators without changing call sites
/// (`fck-mock` provides reference implementations for tests and the CLI's
/// `--mock` mode).
pub struct FederatedCapabilityKernel {
    agent_id: String,
    governance: Arc<dyn GovernanceGate>,
    attestation: Arc<dyn AttestationClient>,
    federation: Arc<dyn FederationClient>,
    assistance: Arc<dyn AssistanceBroker>,
    storage: Arc<dyn StorageAdapter>,
    state: Mutex<Option<PersistedKernelState>>,
}

impl FederatedCapabilityKernel {
    /// Construct a kernel for `agent_id`, wired to the given collaborators.
    ///
    /// The kernel holds no durable state until [`Self::boot`] is called.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        governance: Arc<dyn GovernanceGate>,
        attestation: Arc<dyn AttestationClient>,
        federation: Arc<dyn FederationClient>,
        assistance: Arc<dyn AssistanceBroker>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            governance,
            attestation,
            federation,
            assistance,
            storage,
            state: Mutex::new(None),
        }
    }

    /// The agent this kernel instance acts on behalf of.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Boot the kernel (`spec.md` §4.2).
    ///
    /// On first boot, persists `default_manifest` with `monotonic_counter =
    /// 1`. On subsequent boots, reloads the persisted manifest, verifies its
    /// `agent_id` matches, recomputes `last_manifest_hash`, and increments
    /// `monotonic_counter`. A mismatched `agent_id` fails fatally without
    /// mutating any state.
    pub async fn boot(&self, default_manifest: &CapabilityManifest) -> Result<(), BootError> {
        let key = state_key(&self.agent_id);
        let raw = self.storage.get(&key).await.map_err(BootError::Storage)?;

        let mut guard = self.state.lock().await;
        match raw {
            None => {
                let hash = default_manifest.canonical_hash()?;
                let state = PersistedKernelState {
                    manifest: default_manifest.clone(),
                    last_boot_utc: Utc::now(),
                    last_manifest_hash: hash,
                    monotonic_counter: 1,
                };
                let serialized = canonical_json(&state)?;
                self.storage.set(&key, &serialized).await.map_err(BootError::Storage)?;
                debug!(target: "fck.kernel", agent_id = %self.agent_id, "booted with default manifest");
                *guard = Some(state);
                Ok(())
            }
            Some(raw) => {
                let mut persisted: PersistedKernelState = serde_json::from_str(&raw)
                    .map_err(|e| BootError::CorruptState(e.to_string()))?;
                if persisted.manifest.agent_id != self.agent_id {
                    warn!(
                        target: "fck.kernel",
                        expected = %self.agent_id,
                        found = %persisted.manifest.agent_id,
                        "agent id mismatch on boot"
                    );
                    return Err(BootError::AgentIdMismatch {
                        expected: self.agent_id.clone(),
                        found: persisted.manifest.agent_id,
                    });
                }
                persisted.last_manifest_hash = persisted.manifest.canonical_hash()?;
                persisted.last_boot_utc = Utc::now();
                persisted.monotonic_counter += 1;
                let serialized = canonical_json(&persisted)?;
                self.storage.set(&key, &serialized).await.map_err(BootError::Storage)?;
                info!(
                    target: "fck.kernel",
                    agent_id = %self.agent_id,
                    counter = persisted.monotonic_counter,
                    "rebooted"
                );
                *guard = Some(persisted);
                Ok(())
            }
        }
    }

    /// Return the currently loaded manifest, if the kernel has booted.
    pub async fn get_manifest(&self) -> Option<CapabilityManifest> {
        self.state.lock().await.as_ref().map(|s| s.manifest.clone())
    }

    async fn manifest_snapshot(&self) -> Option<CapabilityManifest> {
        self.state.lock().await.as_ref().map(|s| s.manifest.clone())
    }

    /// Execute a governed remote federation call (`spec.md` §4.3).
    pub async fn governed_federation_call(
        &self,
        req: GovernedCallRequest,
    ) -> Result<FederationCallSuccess, KernelFailure> {
        let manifest = self
            .manifest_snapshot()
            .await
            .ok_or_else(|| KernelFailure::tag(ErrorCode::FederationDisabled.as_str()))?;

        if !manifest.federation.enabled {
            debug!(target: "fck.kernel", agent_id = %self.agent_id, "federation disabled");
            return Err(KernelFailure::tag(ErrorCode::FederationDisabled.as_str()));
        }
        if !manifest.federation.allowed_operations.iter().any(|op| op == &req.operation) {
            debug!(target: "fck.kernel", operation = %req.operation, "operation not allowed");
            return Err(KernelFailure::tag(ErrorCode::OpNotAllowed.as_str()));
        }

        let frame = CanonicalActionFrame::new(
            format!("op_{}", Uuid::new_v4()),
            self.agent_id.clone(),
            req.risk_tier,
            manifest.governance.sdc_version.clone(),
            true,
            true,
            false,
            Utc::now(),
        );

        let decision = self.governance.evaluate(&frame).await;
        if !decision.is_allowed() {
            let reason = decision.reason.unwrap_or_else(|| "denied".to_string());
            warn!(target: "fck.kernel", %reason, "governance denied federation call");
            return Err(KernelFailure::tag(format!("{}:{reason}", ErrorCode::GovDeny.as_str())));
        }

        let input_frame_hash = frame.canonical_hash().map_err(internal_failure)?;

        let mut uva_hash = None;
        if manifest.governance.dvap_required_for_risk_tiers.contains(&req.risk_tier) {
            let attestation = self.attestation.attest(&frame).await;
            match attestation.verdict {
                AttestationVerdict::Attested => uva_hash = attestation.uva_hash,
                AttestationVerdict::Refused => {
                    let reason = attestation.reason.unwrap_or_else(|| "refused".to_string());
                    warn!(target: "fck.kernel", %reason, "attestation refused federation call");
                    return Err(KernelFailure::tag(format!("{}:{reason}", ErrorCode::DvapRefused.as_str()))
                        .with_frame_hash(input_frame_hash));
                }
            }
        }

        let fed_req = FederationRequest {
            trace_id: req.trace_id.clone(),
            agent_id: self.agent_id.clone(),
            operation: req.operation.clone(),
            payload: req.payload.clone(),
            risk_tier: req.risk_tier,
        };
        let response = self.federation.request(fed_req).await;
        if response.ok {
            info!(target: "fck.kernel", operation = %req.operation, "federation call succeeded");
            return Ok(FederationCallSuccess {
                result: response.result.unwrap_or(serde_json::Value::Null),
                input_frame_hash,
                uva_hash,
                source: response.source,
            });
        }

        let base_error = response.error.unwrap_or_else(|| ErrorCode::FederationError.as_str().to_string());
        let assist_hint = self.bounded_assistance_on_failure(&req).await;
        warn!(
            target: "fck.kernel",
            error = %base_error,
            assist_hint = assist_hint.as_deref(),
            "federation call failed"
        );
        let tag = match &assist_hint {
            Some(route) => format!("{base_error} | assist:{route}"),
            None => base_error,
        };
        Err(KernelFailure::tag(tag).with_frame_hash(input_frame_hash))
    }

    /// Bounded assistance-on-failure (`spec.md` §4.6). At most one call to
    /// the assistance broker; any failure there is swallowed and reported as
    /// `None`, never masking the original federation error.
    async fn bounded_assistance_on_failure(&self, req: &GovernedCallRequest) -> Option<String> {
        let manifest = self.manifest_snapshot().await?;
        if !manifest.assistance.enabled {
            debug!(target: "fck.kernel", "assistance disabled, skipping bounded assistance");
            return None;
        }

        let assist_req = AssistanceRequestParams {
            trace_id: req.trace_id.clone(),
            agent_id: self.agent_id.clone(),
            query: format!("federation operation `{}` failed", req.operation),
            context: Some(req.payload.clone()),
            risk_tier: req.risk_tier,
        };
        let response = self.assistance.request_assistance(assist_req).await;
        if response.ok {
            response.route_used.map(assistance_route_tag)
        } else {
            None
        }
    }

    /// Execute an explicit, governed assistance request (`spec.md` §4.4).
    ///
    /// The frame's `action_id` is content-addressed: `"assist_" +
    /// first12HexChars(SHA256(trace_id || query))`.
    pub async fn request_assistance(
        &self,
        req: AssistanceCallRequest,
    ) -> Result<AssistanceCallSuccess, KernelFailure> {
        let manifest = self
            .manifest_snapshot()
            .await
            .ok_or_else(|| KernelFailure::tag(ErrorCode::AssistanceDisabled.as_str()))?;

        if !manifest.assistance.enabled {
            debug!(target: "fck.kernel", agent_id = %self.agent_id, "assistance disabled");
            return Err(KernelFailure::tag(ErrorCode::AssistanceDisabled.as_str()));
        }

        let mut preimage = req.trace_id.clone();
        preimage.push_str(&req.query);
        let action_id = format!("assist_{}", sha256_hex_prefix12(preimage.as_bytes()));

        let frame = CanonicalActionFrame::new(
            action_id,
            self.agent_id.clone(),
            req.risk_tier,
            manifest.governance.sdc_version.clone(),
            true,
            true,
            false,
            Utc::now(),
        );

        let decision = self.governance.evaluate(&frame).await;
        if !decision.is_allowed() {
            let reason = decision.reason.unwrap_or_else(|| "denied".to_string());
            warn!(target: "fck.kernel", %reason, "governance denied assistance request");
            return Err(KernelFailure::tag(format!("{}:{reason}", ErrorCode::GovDeny.as_str())));
        }

        let input_frame_hash = frame.canonical_hash().map_err(internal_failure)?;

        let mut uva_hash = None;
        if manifest.governance.dvap_required_for_risk_tiers.contains(&req.risk_tier) {
            let attestation = self.attestation.attest(&frame).await;
            match attestation.verdict {
                AttestationVerdict::Attested => uva_hash = attestation.uva_hash,
                AttestationVerdict::Refused => {
                    let reason = attestation.reason.unwrap_or_else(|| "refused".to_string());
                    warn!(target: "fck.kernel", %reason, "attestation refused assistance request");
                    return Err(KernelFailure::tag(format!("{}:{reason}", ErrorCode::DvapRefused.as_str()))
                        .with_frame_hash(input_frame_hash));
                }
            }
        }

        let assist_req = AssistanceRequestParams {
            trace_id: req.trace_id.clone(),
            agent_id: self.agent_id.clone(),
            query: req.query.clone(),
            context: req.context.clone(),
            risk_tier: req.risk_tier,
        };
        let response = self.assistance.request_assistance(assist_req).await;
        if response.ok {
            info!(target: "fck.kernel", "assistance request succeeded");
            Ok(AssistanceCallSuccess {
                response: response.response.unwrap_or(serde_json::Value::Null),
                route_used: response.route_used,
                input_frame_hash,
                uva_hash,
            })
        } else {
            let reason = response.error.unwrap_or_else(|| "refused".to_string());
            warn!(target: "fck.kernel", %reason, "assistance request failed");
            Err(KernelFailure::tag(format!("{}:{reason}", ErrorCode::AssistanceFailed.as_str()))
                .with_frame_hash(input_frame_hash))
        }
    }

    /// Apply an update package (`spec.md` §4.5).
    ///
    /// `verifier` and `applier` are the two update-time callbacks: the
    /// signature algorithm and the bundle-integration strategy are both
    /// policy choices external to the kernel. On any failure,
    /// `last_manifest_hash` is left untouched.
    pub async fn apply_update_package(
        &self,
        package: &UpdatePackage,
        risk_tier: RiskTier,
        verifier: &dyn SignatureVerifier,
        applier: &dyn BundleApplier,
    ) -> Result<UpdateOutcome, KernelFailure> {
        let manifest = self
            .manifest_snapshot()
            .await
            .ok_or_else(|| KernelFailure::tag(ErrorCode::UpdatesDisabled.as_str()))?;

        if !manifest.updates.enabled {
            debug!(target: "fck.kernel", agent_id = %self.agent_id, "updates disabled");
            return Err(KernelFailure::tag(ErrorCode::UpdatesDisabled.as_str()));
        }
        if !manifest.updates.allowed_channels.contains(&package.channel) {
            debug!(target: "fck.kernel", package_id = %package.package_id, "update channel not allowed");
            return Err(KernelFailure::tag(ErrorCode::UpdateChannelNotAllowed.as_str()));
        }
        if manifest.updates.require_signature {
            let verified = verifier
                .verify(package, &manifest.updates.trusted_signers)
                .await
                .map_err(internal_failure)?;
            if !verified {
                warn!(target: "fck.kernel", package_id = %package.package_id, "invalid update signature");
                return Err(KernelFailure::tag(ErrorCode::InvalidSignature.as_str()));
            }
        }

        let signer = package.signer_id.clone().unwrap_or_default();
        let frame = CanonicalActionFrame::new(
            format!("update_{}", package.package_id),
            self.agent_id.clone(),
            risk_tier,
            manifest.governance.sdc_version.clone(),
            true,
            true,
            false,
            Utc::now(),
        )
        .with_extension("channel", update_channel_tag(package.channel))
        .with_extension("version", package.version.clone())
        .with_extension("signer", signer);

        let decision = self.governance.evaluate(&frame).await;
        if !decision.is_allowed() {
            let reason = decision.reason.unwrap_or_else(|| "denied".to_string());
            warn!(target: "fck.kernel", %reason, "governance denied update application");
            return Err(KernelFailure::tag(format!("{}:{reason}", ErrorCode::GovDeny.as_str())));
        }

        if manifest.updates.require_dvap_for_risk_tiers.contains(&risk_tier) {
            let attestation = self.attestation.attest(&frame).await;
            if matches!(attestation.verdict, AttestationVerdict::Refused) {
                let reason = attestation.reason.unwrap_or_else(|| "refused".to_string());
                warn!(target: "fck.kernel", %reason, "attestation refused update application");
                return Err(KernelFailure::tag(format!("{}:{reason}", ErrorCode::DvapRefused.as_str())));
            }
        }

        applier.apply(package).await.map_err(|e| {
            warn!(target: "fck.kernel", error = %e, "bundle applier failed, state left untouched");
            KernelFailure::tag(format!("{}:{e}", ErrorCode::UpdateApplyFailed.as_str()))
        })?;

        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or_else(|| internal_failure("kernel not booted"))?;
        let new_hash = state.manifest.canonical_hash().map_err(internal_failure)?;
        state.last_manifest_hash = new_hash.clone();
        let serialized = canonical_json(&*state).map_err(internal_failure)?;
        drop(guard);

        self.storage
            .set(&state_key(&self.agent_id), &serialized)
            .await
            .map_err(|e| KernelFailure::tag(format!("{}:{e}", ErrorCode::StorageFailed.as_str())))?;

        info!(target: "fck.kernel", package_id = %package.package_id, "update package applied");
        Ok(UpdateOutcome { last_manifest_hash: new_hash })
    }
}

// ---------------------------------------------------------------------------
// KernelRegistry
// ---------------------------------------------------------------------------

/// Multiplexes many per-agent kernels behind a single registry, the natural
/// extension point `spec.md` §5 calls for without specifying a concrete
/// shape. Each kernel's own state mutations remain linearized by its own
/// internal mutex; this registry only guards insertion/lookup.
pub struct KernelRegistry {
    kernels: Mutex<BTreeMap<String, Arc<Mutex<FederatedCapabilityKernel>>>>,
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { kernels: Mutex::new(BTreeMap::new()) }
    }

    /// Register `kernel` under `agent_id`, returning a shared handle.
    pub async fn register(
        &self,
        agent_id: impl Into<String>,
        kernel: FederatedCapabilityKernel,
    ) -> Arc<Mutex<FederatedCapabilityKernel>> {
        let handle = Arc::new(Mutex::new(kernel));
        self.kernels.lock().await.insert(agent_id.into(), handle.clone());
        handle
    }

    /// Look up the kernel registered for `agent_id`, if any.
    pub async fn get(&self, agent_id: &str) -> Option<Arc<Mutex<FederatedCapabilityKernel>>> {
        self.kernels.lock().await.get(agent_id).cloned()
    }

    /// List the agent ids currently registered, in sorted order.
    pub async fn agent_ids(&self) -> Vec<String> {
        self.kernels.lock().await.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
