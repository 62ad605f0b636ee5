pub mod config;
pub mod context;
pub mod disambiguation;
pub mod domain;
pub mod errors;
pub mod quota;
pub mod resolver;

pub use context::ContextStore;
pub use domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag, ResponseOutcome};
pub use domain::conversation::{ConversationContext, ConversationId, ConversationTurn, Role};
pub use domain::directory::{DirectoryEntity, EntityId};
pub use domain::routing::{RoutingDecision, RoutingSource};
pub use errors::{ApplicationError, ErrorKind};
pub use quota::{QuotaGuard, QuotaPolicy};
pub use resolver::{EntityMatch, EntityResolver, MatchTier, Resolution, ResolutionStatus};
