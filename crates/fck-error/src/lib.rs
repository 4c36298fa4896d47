//! Unified error taxonomy with stable error codes for the Federated
//! Capability Kernel.
//!
//! Every kernel error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag matching the kernel's own error lexicon), a human-readable
//! message, an optional cause chain, and arbitrary key-value context. Use
//! the builder returned by [`FckError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration refusals: a capability is disabled in the manifest.
    Configuration,
    /// Policy refusals: governance or attestation declined the action.
    Policy,
    /// Transport failures: the federation or assistance route errored.
    Transport,
    /// Integrity failures: signature or hash verification failed.
    Integrity,
    /// Boot-time identity mismatch.
    Identity,
    /// Config file loading/validation errors.
    Config,
    /// Storage adapter errors.
    Storage,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Policy => "policy",
            Self::Transport => "transport",
            Self::Integrity => "integrity",
            Self::Identity => "identity",
            Self::Config => "config",
            Self::Storage => "storage",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serializes to the literal `SCREAMING_SNAKE_CASE` tag the
/// kernel's governed entrypoints return to collaborators, so the taxonomy
/// crate and the kernel's string-tag contract can never silently drift
/// apart (see [`tests::all_codes_match_kernel_tag`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Federation is disabled in the agent's manifest.
    FederationDisabled,
    /// The requested operation is not in `allowed_operations`.
    OpNotAllowed,
    /// The governance gate denied the action.
    GovDeny,
    /// Attestation refused to vouch for the action.
    DvapRefused,
    /// Assistance is disabled in the agent's manifest.
    AssistanceDisabled,
    /// Updates are disabled in the agent's manifest.
    UpdatesDisabled,
    /// The update package's channel is not in `allowed_channels`.
    UpdateChannelNotAllowed,
    /// The update package's signature failed verification.
    InvalidSignature,
    /// The federation transport itself errored.
    FederationError,
    /// The assistance broker returned an explicit-request failure.
    AssistanceFailed,
    /// The injected bundle applier failed to apply an update package.
    UpdateApplyFailed,
    /// The manifest's `agent_id` does not match the kernel's configured id.
    AgentIdMismatch,

    /// Configuration file or value is invalid.
    ConfigInvalid,
    /// Storage adapter failed to read or write state.
    StorageFailed,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FederationDisabled | Self::AssistanceDisabled | Self::UpdatesDisabled => {
                ErrorCategory::Configuration
            }
            Self::OpNotAllowed | Self::GovDeny | Self::UpdateChannelNotAllowed => {
                ErrorCategory::Policy
            }
            Self::DvapRefused => ErrorCategory::Policy,
            Self::FederationError | Self::AssistanceFailed | Self::UpdateApplyFailed => {
                ErrorCategory::Transport
            }
            Self::InvalidSignature => ErrorCategory::Integrity,
            Self::AgentIdMismatch => ErrorCategory::Identity,
            Self::ConfigInvalid => ErrorCategory::Config,
            Self::StorageFailed => ErrorCategory::Storage,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"FEDERATION_DISABLED"`), identical to the literal tag the kernel's
    /// governed entrypoints return.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FederationDisabled => "FEDERATION_DISABLED",
            Self::OpNotAllowed => "OP_NOT_ALLOWED",
            Self::GovDeny => "GOV_DENY",
            Self::DvapRefused => "DVAP_REFUSED",
            Self::AssistanceDisabled => "ASSISTANCE_DISABLED",
            Self::UpdatesDisabled => "UPDATES_DISABLED",
            Self::UpdateChannelNotAllowed => "UPDATE_CHANNEL_NOT_ALLOWED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::FederationError => "FEDERATION_ERROR",
            Self::AssistanceFailed => "ASSISTANCE_FAILED",
            Self::UpdateApplyFailed => "UPDATE_APPLY_FAILED",
            Self::AgentIdMismatch => "AGENT_ID_MISMATCH",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::StorageFailed => "STORAGE_FAILED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FckError
// ---------------------------------------------------------------------------

/// Unified kernel error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use fck_error::{FckError, ErrorCode};
///
/// let err = FckError::new(ErrorCode::DvapRefused, "attestation declined")
///     .with_context("agent_id", "agent-7")
///     .with_context("risk_tier", "T2_HIGH_STAKES");
/// ```
pub struct FckError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl FckError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Render this error's `code` as the literal kernel tag, optionally
    /// suffixed with `| assist:<route>` per the governed federation call
    /// error-augmentation rule.
    #[must_use]
    pub fn as_tag(&self, assist_hint: Option<&str>) -> String {
        match assist_hint {
            Some(route) => format!("{} | assist:{route}", self.code.as_str()),
            None => self.code.as_str().to_string(),
        }
    }
}

impl fmt::Debug for FckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("FckError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for FckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serializable snapshot of an [`FckError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FckErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&FckError> for FckErrorDto {
    fn from(err: &FckError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<FckErrorDto> for FckError {
    fn from(dto: FckErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    /// All error codes for exhaustive iteration in tests.
    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::FederationDisabled,
        ErrorCode::OpNotAllowed,
        ErrorCode::GovDeny,
        ErrorCode::DvapRefused,
        ErrorCode::AssistanceDisabled,
        ErrorCode::UpdatesDisabled,
        ErrorCode::UpdateChannelNotAllowed,
        ErrorCode::InvalidSignature,
        ErrorCode::FederationError,
        ErrorCode::AssistanceFailed,
        ErrorCode::UpdateApplyFailed,
        ErrorCode::AgentIdMismatch,
        ErrorCode::ConfigInvalid,
        ErrorCode::StorageFailed,
        ErrorCode::Internal,
    ];

    // -- Construction & Display -----------------------------------------

    #[test]
    fn basic_construction() {
        let err = FckError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = FckError::new(ErrorCode::OpNotAllowed, "operation not declared");
        assert_eq!(err.to_string(), "[OP_NOT_ALLOWED] operation not declared");
    }

    #[test]
    fn display_with_context() {
        let err = FckError::new(ErrorCode::DvapRefused, "declined").with_context("agent_id", "a1");
        let s = err.to_string();
        assert!(s.starts_with("[DVAP_REFUSED] declined"));
        assert!(s.contains("agent_id"));
    }

    #[test]
    fn as_tag_without_assist_hint() {
        let err = FckError::new(ErrorCode::GovDeny, "denied");
        assert_eq!(err.as_tag(None), "GOV_DENY");
    }

    #[test]
    fn as_tag_with_assist_hint() {
        let err = FckError::new(ErrorCode::DvapRefused, "declined");
        assert_eq!(err.as_tag(Some("federation")), "DVAP_REFUSED | assist:federation");
    }

    #[test]
    fn debug_with_source() {
        let src = io::Error::new(io::ErrorKind::NotFound, "state missing");
        let err = FckError::new(ErrorCode::StorageFailed, "load failed").with_source(src);
        let dbg = format!("{err:?}");
        assert!(dbg.contains("source"));
        assert!(dbg.contains("state missing"));
    }

    // -- Error code categorization --------------------------------------

    #[test]
    fn configuration_codes_categorised() {
        assert_eq!(ErrorCode::FederationDisabled.category(), ErrorCategory::Configuration);
        assert_eq!(ErrorCode::AssistanceDisabled.category(), ErrorCategory::Configuration);
        assert_eq!(ErrorCode::UpdatesDisabled.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn policy_codes_categorised() {
        assert_eq!(ErrorCode::OpNotAllowed.category(), ErrorCategory::Policy);
        assert_eq!(ErrorCode::GovDeny.category(), ErrorCategory::Policy);
        assert_eq!(ErrorCode::DvapRefused.category(), ErrorCategory::Policy);
        assert_eq!(ErrorCode::UpdateChannelNotAllowed.category(), ErrorCategory::Policy);
    }

    #[test]
    fn transport_and_integrity_codes_categorised() {
        assert_eq!(ErrorCode::FederationError.category(), ErrorCategory::Transport);
        assert_eq!(ErrorCode::AssistanceFailed.category(), ErrorCategory::Transport);
        assert_eq!(ErrorCode::UpdateApplyFailed.category(), ErrorCategory::Transport);
        assert_eq!(ErrorCode::InvalidSignature.category(), ErrorCategory::Integrity);
    }

    #[test]
    fn identity_code_categorised() {
        assert_eq!(ErrorCode::AgentIdMismatch.category(), ErrorCategory::Identity);
    }

    // -- Builder pattern ------------------------------------------------

    #[test]
    fn builder_with_context_multiple_keys() {
        let err = FckError::new(ErrorCode::GovDeny, "denied")
            .with_context("agent_id", "a1")
            .with_context("risk_tier", "T2_HIGH_STAKES")
            .with_context("retries", 3);
        assert_eq!(err.context.len(), 3);
        assert_eq!(err.context["agent_id"], serde_json::json!("a1"));
        assert_eq!(err.context["retries"], serde_json::json!(3));
    }

    #[test]
    fn builder_chaining_all() {
        let src = io::Error::other("underlying");
        let err = FckError::new(ErrorCode::ConfigInvalid, "bad config")
            .with_context("file", "kernel.toml")
            .with_source(src);
        assert_eq!(err.code, ErrorCode::ConfigInvalid);
        assert_eq!(err.context["file"], serde_json::json!("kernel.toml"));
        assert!(err.source.is_some());
    }

    #[test]
    fn category_shorthand() {
        let err = FckError::new(ErrorCode::AgentIdMismatch, "mismatch");
        assert_eq!(err.category(), ErrorCategory::Identity);
    }

    // -- Serialization / Deserialization --------------------------------

    #[test]
    fn error_code_serde_roundtrip() {
        let code = ErrorCode::FederationDisabled;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, r#""FEDERATION_DISABLED""#);
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn error_category_serde_roundtrip() {
        let cat = ErrorCategory::Policy;
        let json = serde_json::to_string(&cat).unwrap();
        assert_eq!(json, r#""policy""#);
        let back: ErrorCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cat);
    }

    #[test]
    fn dto_roundtrip_without_source() {
        let err = FckError::new(ErrorCode::UpdateChannelNotAllowed, "bad channel")
            .with_context("channel", "SKILL_CAPSULE");
        let dto: FckErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: FckErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        assert!(back.source_message.is_none());
    }

    #[test]
    fn dto_roundtrip_with_source() {
        let src = io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke");
        let err = FckError::new(ErrorCode::FederationError, "transport down").with_source(src);
        let dto: FckErrorDto = (&err).into();
        assert_eq!(dto.source_message.as_deref(), Some("pipe broke"));
        let json = serde_json::to_string(&dto).unwrap();
        assert!(json.contains("pipe broke"));
    }

    // -- Error chain (source) preservation ------------------------------

    #[test]
    fn std_error_source_chain() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err = FckError::new(ErrorCode::StorageFailed, "storage").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "not found");
    }

    #[test]
    fn std_error_source_none_by_default() {
        let err = FckError::new(ErrorCode::Internal, "oops");
        assert!(std::error::Error::source(&err).is_none());
    }

    // -- Unique string representations ----------------------------------

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            let s = code.as_str();
            assert!(seen.insert(s), "duplicate as_str value: {s}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_display_matches_as_str() {
        for code in ALL_CODES {
            assert_eq!(code.to_string(), code.as_str());
        }
    }

    /// Every tag in `spec.md`'s §4.7 error lexicon has a matching `ErrorCode`.
    #[test]
    fn all_codes_match_kernel_tag() {
        let kernel_tags = [
            "FEDERATION_DISABLED",
            "OP_NOT_ALLOWED",
            "GOV_DENY",
            "DVAP_REFUSED",
            "ASSISTANCE_DISABLED",
            "UPDATES_DISABLED",
            "UPDATE_CHANNEL_NOT_ALLOWED",
            "INVALID_SIGNATURE",
            "FEDERATION_ERROR",
            "AGENT_ID_MISMATCH",
        ];
        for tag in kernel_tags {
            assert!(
                ALL_CODES.iter().any(|c| c.as_str() == tag),
                "no ErrorCode for kernel tag {tag}"
            );
        }
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let expected = format!(r#""{}""#, code.as_str());
            assert_eq!(json, expected, "mismatch for {code:?}");
        }
    }

    #[test]
    fn error_category_display() {
        assert_eq!(ErrorCategory::Policy.to_string(), "policy");
        assert_eq!(ErrorCategory::Transport.to_string(), "transport");
        assert_eq!(ErrorCategory::Internal.to_string(), "internal");
    }
}
