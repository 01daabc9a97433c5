//! Node roster and chain propagation
//!
//! Nodes are a fixed, statically known set living in one process. Propagation
//! is a direct call into each sibling's engine; there is no discovery or wire
//! protocol.

pub mod roster;

pub use roster::{BroadcastReport, NodeName, PeerSync, Roster, NODE_KEYSTORE_FILE};
