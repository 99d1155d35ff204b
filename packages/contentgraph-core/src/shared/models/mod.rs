//! Shared models

mod error;
mod marketplace;
mod node;
mod relationship;

pub use error::{ErrorCategory, ErrorKind, GraphError, PackError, Result};
pub use marketplace::{Marketplace, MarketplaceSet};
pub use node::{
    node_id_of, split_node_id, ContentNode, ContentType, DEFAULT_FROMVERSION, DEFAULT_TOVERSION,
};
pub use relationship::{Relationship, RelationshipKind, StoredRelationship};

/// Node identifier type alias
pub type NodeId = String;
