use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    Missing {
        capability: String,
    },
    Expired {
        capability: String,
    },
    PatternMismatch {
        capability: String,
        resource: String,
    },
    OperationNotAllowed {
        capability: String,
        operation: String,
    },
    UsageExceeded {
        capability: String,
        limit: u64,
    },
    DisallowedAttribute {
        type_name: String,
        attribute: String,
    },
    InvalidToken {
        reason: String,
    },
}

impl Display for CapabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityError::Missing { capability } => {
                write!(f, "missing capability '{capability}'")
            }
            CapabilityError::Expired { capability } => {
                write!(f, "capability '{capability}' has expired")
            }
            CapabilityError::PatternMismatch {
                capability,
                resource,
            } => write!(
                f,
                "resource '{resource}' matches no pattern of capability '{capability}'"
            ),
            CapabilityError::OperationNotAllowed {
                capability,
                operation,
            } => write!(
                f,
                "operation '{operation}' is not allowed by capability '{capability}'"
            ),
            CapabilityError::UsageExceeded { capability, limit } => write!(
                f,
                "capability '{capability}' exceeded its usage limit of {limit}"
            ),
            CapabilityError::DisallowedAttribute {
                type_name,
                attribute,
            } => write!(f, "attribute '{attribute}' of '{type_name}' is not accessible"),
            CapabilityError::InvalidToken { reason } => {
                write!(f, "invalid capability token: {reason}")
            }
        }
    }
}

impl std::error::Error for CapabilityError {}
