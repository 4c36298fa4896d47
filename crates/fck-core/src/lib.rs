//! fck-core
//!
//! The stable contract for the Federated Capability Kernel.
//!
//! If you only take one dependency, take this one: it defines the wire
//! types every collaborator (governance, attestation, federation,
//! assistance, storage) exchanges with the kernel, plus the canonical
//! serialization and hashing rules those exchanges rely on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Schema version pinned into every [`CapabilityManifest`].
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0.0";

/// The hash algorithm literal recorded on every [`CanonicalActionFrame`].
pub const HASH_ALGORITHM: &str = "SHA-256";

// ---------------------------------------------------------------------------
// RiskTier
// ---------------------------------------------------------------------------

/// Ordered risk tag attached to every governed action.
///
/// Tiers are membership-tested against manifest sets
/// (`dvap_required_for_risk_tiers`, `require_dvap_for_risk_tiers`); they are
/// never numerically compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    /// Lowest-stakes actions.
    T0Low,
    /// Everyday, standard-stakes actions.
    T1Standard,
    /// High-stakes actions that usually require attestation.
    T2HighStakes,
    /// Regulated actions; almost always require attestation.
    T3Regulated,
}

// ---------------------------------------------------------------------------
// Extension values
// ---------------------------------------------------------------------------

/// A deterministic, scalar-only value usable in [`CanonicalActionFrame::extensions`].
///
/// `spec.md` requires extensions to contain "only deterministic, scalar
/// values" (string, integer, or boolean) — this is modeled as a closed enum
/// rather than `serde_json::Value` so a non-scalar extension is a type error
/// at construction time, not a canonicalization concern at hash time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ExtensionValue {
    /// A string scalar.
    Str(String),
    /// An integer scalar. No floating-point values are permitted anywhere
    /// in a frame or manifest (§4.1).
    Int(i64),
    /// A boolean scalar.
    Bool(bool),
}

impl From<&str> for ExtensionValue {
    fn from(s: &str) -> Self {
        ExtensionValue::Str(s.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(s: String) -> Self {
        ExtensionValue::Str(s)
    }
}

impl From<i64> for ExtensionValue {
    fn from(n: i64) -> Self {
        ExtensionValue::Int(n)
    }
}

impl From<bool> for ExtensionValue {
    fn from(b: bool) -> Self {
        ExtensionValue::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// CanonicalActionFrame
// ---------------------------------------------------------------------------

/// The atomic unit of auditable intent.
///
/// A frame is the *sole* input to governance and attestation — no
/// side-channel may influence the verdict. It is ephemeral: frames live
/// only across the pipeline of a single kernel entrypoint and are never
/// persisted directly (only their hash is, as part of a result).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalActionFrame {
    /// Opaque identifier, unique per logical action.
    pub action_id: String,
    /// The agent this frame was built for.
    pub agent_id: String,
    /// The declared risk tier of the action.
    pub risk_tier: RiskTier,
    /// Pinned policy corpus version the frame is judged under.
    pub sdc_version: String,
    /// Whether the action satisfies the declared policy constraints.
    ///
    /// This is a frame-builder-computed field, distinct from the
    /// governance gate's own verdict — see `spec.md` §3: "policy_verdict".
    pub policy_verdict: bool,
    /// Whether all constraints attached to the action have been satisfied.
    pub constraints_satisfied: bool,
    /// Whether a human has confirmed this action out of band.
    pub human_confirmation: bool,
    /// ISO-8601 UTC timestamp, second or finer resolution.
    pub timestamp_utc: chrono::DateTime<chrono::Utc>,
    /// Fixed literal hash algorithm identifier (`"SHA-256"`).
    pub hash_algorithm: String,
    /// Deterministic, scalar-only extension fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, ExtensionValue>,
}

impl CanonicalActionFrame {
    /// Build a frame with `hash_algorithm` pinned to [`HASH_ALGORITHM`].
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action_id: impl Into<String>,
        agent_id: impl Into<String>,
        risk_tier: RiskTier,
        sdc_version: impl Into<String>,
        policy_verdict: bool,
        constraints_satisfied: bool,
        human_confirmation: bool,
        timestamp_utc: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            agent_id: agent_id.into(),
            risk_tier,
            sdc_version: sdc_version.into(),
            policy_verdict,
            constraints_satisfied,
            human_confirmation,
            timestamp_utc,
            hash_algorithm: HASH_ALGORITHM.to_string(),
            extensions: BTreeMap::new(),
        }
    }

    /// Attach an extension field, returning the frame for chaining.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Compute the canonical SHA-256 hash of this frame (§4.1).
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] if the frame cannot be serialized.
    pub fn canonical_hash(&self) -> Result<String, ContractError> {
        let json = canonical_json(self)?;
        Ok(sha256_hex(json.as_bytes()))
    }
}

// ---------------------------------------------------------------------------
// CapabilityManifest
// ---------------------------------------------------------------------------

/// Pinned, schema-versioned declaration of what an agent may do.
///
/// Unknown fields are rejected at load time (`#[serde(deny_unknown_fields)]`)
/// to prevent silent capability drift, per `spec.md` §9.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CapabilityManifest {
    /// Literal `"1.0.0"`.
    pub schema_version: String,
    /// Must match the kernel's constructor argument; mismatch at load is fatal.
    pub agent_id: String,
    /// Federation capability section.
    pub federation: FederationCapability,
    /// Assistance capability section.
    pub assistance: AssistanceCapability,
    /// Update capability section.
    pub updates: UpdateCapability,
    /// Governance capability section.
    pub governance: GovernanceCapability,
}

impl CapabilityManifest {
    /// Build a manifest with `schema_version` pinned to [`MANIFEST_SCHEMA_VERSION`].
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            agent_id: agent_id.into(),
            federation: FederationCapability::default(),
            assistance: AssistanceCapability::default(),
            updates: UpdateCapability::default(),
            governance: GovernanceCapability::default(),
        }
    }

    /// Compute the canonical SHA-256 hash of this manifest (§4.1, §4.2).
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] if the manifest cannot be serialized.
    pub fn canonical_hash(&self) -> Result<String, ContractError> {
        let json = canonical_json(self)?;
        Ok(sha256_hex(json.as_bytes()))
    }
}

/// Federation section of a [`CapabilityManifest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct FederationCapability {
    /// Whether federation calls are permitted at all.
    pub enabled: bool,
    /// Recognized federation source tags.
    pub sources: Vec<String>,
    /// Operation tags the agent is allowed to invoke.
    pub allowed_operations: Vec<String>,
}

/// Assistance section of a [`CapabilityManifest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct AssistanceCapability {
    /// Whether assistance requests are permitted at all.
    pub enabled: bool,
    /// Allowed assistance routes.
    pub routes: Vec<AssistanceRoute>,
    /// Advisory cap on attempts; the kernel does not enforce this (§4.6, §9).
    pub max_attempts: u32,
}

/// A route an [`AssistanceCapability`] may be routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssistanceRoute {
    /// Route to the federation.
    Federation,
    /// Escalate to a human.
    HumanEscalation,
    /// Route to a peer agent.
    PeerAgent,
}

/// Update section of a [`CapabilityManifest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct UpdateCapability {
    /// Whether update application is permitted at all.
    pub enabled: bool,
    /// Channels the agent may install updates from.
    pub allowed_channels: Vec<UpdateChannel>,
    /// Whether a valid signature is mandatory for any package.
    pub require_signature: bool,
    /// Whether governance approval is mandatory. Always honored regardless
    /// of this flag's value — see `spec.md` §3 ("always honored").
    pub require_governance_approval: bool,
    /// Risk tiers for which attestation is mandatory before applying.
    pub require_dvap_for_risk_tiers: Vec<RiskTier>,
    /// Fingerprints of signers trusted to sign update packages.
    pub trusted_signers: Vec<String>,
}

/// Channel an [`UpdatePackage`] may be delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateChannel {
    /// A skill capsule package.
    SkillCapsule,
    /// A configuration bundle package.
    ConfigBundle,
}

/// Governance section of a [`CapabilityManifest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct GovernanceCapability {
    /// Pinned policy corpus version, echoed into every built frame.
    pub sdc_version: String,
    /// Ordered list of invariant names governance must find present.
    pub invariant_keys_required: Vec<String>,
    /// Risk tiers for which attestation is mandatory for federation calls.
    pub dvap_required_for_risk_tiers: Vec<RiskTier>,
}

// ---------------------------------------------------------------------------
// PersistedKernelState
// ---------------------------------------------------------------------------

/// The kernel's durable footprint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PersistedKernelState {
    /// The agent's current capability manifest.
    pub manifest: CapabilityManifest,
    /// Timestamp of the most recent boot.
    pub last_boot_utc: chrono::DateTime<chrono::Utc>,
    /// Hex SHA-256 hash of the canonical manifest as of the last boot or update.
    pub last_manifest_hash: String,
    /// Strictly increasing boot-generation counter.
    pub monotonic_counter: u64,
}

// ---------------------------------------------------------------------------
// UpdatePackage
// ---------------------------------------------------------------------------

/// Data-only update bundle. The kernel never interprets `payload_b64`; it is
/// opaque data handed to an external applier.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdatePackage {
    /// Unique package identifier.
    pub package_id: String,
    /// Delivery channel.
    pub channel: UpdateChannel,
    /// Package version string.
    pub version: String,
    /// ISO-8601 UTC creation timestamp.
    pub created_utc: chrono::DateTime<chrono::Utc>,
    /// Base64-encoded opaque payload.
    pub payload_b64: String,
    /// Base64-encoded signature over the payload, if signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_b64: Option<String>,
    /// Fingerprint of the signer, if signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Canonical serialization and hashing (§4.1)
// ---------------------------------------------------------------------------

/// Errors from contract-level operations (serialization, hashing).
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// JSON serialization or deserialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A canonicalized value: recursively sorted maps, order-preserving
/// sequences, and locale-independent scalars. No floating-point variant
/// exists — §4.1 forbids floats in frames and manifests.
#[derive(Debug, Clone, PartialEq)]
enum CanonicalValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Seq(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Lower a [`serde_json::Value`] into a [`CanonicalValue`], rejecting floats.
    fn from_json(value: &serde_json::Value) -> Result<Self, ContractError> {
        Ok(match value {
            serde_json::Value::Null => CanonicalValue::Null,
            serde_json::Value::Bool(b) => CanonicalValue::Bool(*b),
            serde_json::Value::Number(n) => {
                let i = n.as_i64().ok_or_else(|| {
                    ContractError::Json(serde::de::Error::custom(format!(
                        "non-integer number in canonical frame/manifest: {n}"
                    )))
                })?;
                CanonicalValue::Int(i)
            }
            serde_json::Value::String(s) => CanonicalValue::Str(s.clone()),
            serde_json::Value::Array(arr) => {
                let mut out = Vec::with_capacity(arr.len());
                for v in arr {
                    out.push(CanonicalValue::from_json(v)?);
                }
                CanonicalValue::Seq(out)
            }
            serde_json::Value::Object(obj) => {
                let mut out = BTreeMap::new();
                for (k, v) in obj {
                    out.insert(k.clone(), CanonicalValue::from_json(v)?);
                }
                CanonicalValue::Map(out)
            }
        })
    }

    /// Emit the fixed, whitespace-free, locale-independent serialization.
    fn write(&self, out: &mut String) {
        match self {
            CanonicalValue::Null => out.push_str("null"),
            CanonicalValue::Bool(true) => out.push_str("true"),
            CanonicalValue::Bool(false) => out.push_str("false"),
            CanonicalValue::Int(i) => out.push_str(&i.to_string()),
            CanonicalValue::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        c if (c as u32) < 0x20 => {
                            out.push_str(&format!("\\u{:04x}", c as u32));
                        }
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            CanonicalValue::Seq(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write(out);
                }
                out.push(']');
            }
            CanonicalValue::Map(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    CanonicalValue::Str(k.clone()).write(out);
                    out.push(':');
                    v.write(out);
                }
                out.push('}');
            }
        }
    }
}

/// Produce the canonical serialization of `value` used for hashing (§4.1).
///
/// Keys are emitted in lexicographic (codepoint) order at every mapping
/// level, sequences preserve input order, and there is no whitespace
/// between tokens. Two semantically equal values — regardless of the
/// insertion order of any map fields — produce byte-identical output.
///
/// # Errors
///
/// Returns [`ContractError::Json`] if `value` cannot be serialized, or if it
/// contains a floating-point number (forbidden in frames and manifests).
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, ContractError> {
    let v = serde_json::to_value(value)?;
    let canonical = CanonicalValue::from_json(&v)?;
    let mut out = String::new();
    canonical.write(&mut out);
    Ok(out)
}

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Return the first 12 hex characters of `sha256_hex(bytes)`.
///
/// Used to derive content-addressed action ids (§4.4:
/// `"assist_" + first12HexChars(SHA256(trace_id || query))`).
#[must_use]
pub fn sha256_hex_prefix12(bytes: &[u8]) -> String {
    let full = sha256_hex(bytes);
    full[..12].to_string()
}
