//! Admission decisions produced by the pipeline gates.
//!
//! Gates return a `GateOutcome` instead of raising; the middleware wrapping
//! each gate turns a denial into the matching `ApiError`.

use std::fmt;

/// Why a gate refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// No API key header on a protected route.
    CredentialRequired,
    /// API key present but not the configured one.
    InvalidCredential,
    /// Mutating request without a signature header.
    SignatureRequired,
    /// Signature does not match the request body.
    InvalidSignature,
}

impl DenialReason {
    /// Returns true for reasons raised by the credential gate.
    pub const fn is_authentication(self) -> bool {
        matches!(self, Self::CredentialRequired | Self::InvalidCredential)
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialRequired => write!(f, "API key is required"),
            Self::InvalidCredential => write!(f, "Invalid API key"),
            Self::SignatureRequired => write!(f, "Webhook signature is required"),
            Self::InvalidSignature => write!(f, "Invalid webhook signature"),
        }
    }
}

/// Result of running a single gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Request may proceed to the next stage.
    Admitted,
    /// Request terminates with the given reason.
    Denied(DenialReason),
}

impl GateOutcome {
    /// Returns true when the request was admitted.
    pub const fn is_admitted(self) -> bool {
        matches!(self, Self::Admitted)
    }
}
