//! Token-based access control with hierarchical contexts.

mod context;
mod error;
mod pattern;
mod token;

pub use self::context::{
    current_context, describe_capability, enter_context, has_capability, list_capabilities,
    CapabilityContext, CapabilityDescription, ContextGuard, ExecutionKind,
};
pub use self::error::CapabilityError;
pub use self::pattern::ResourcePattern;
pub use self::token::{CapabilityToken, Constraints};
