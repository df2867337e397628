//! vSphere inventory model.
//!
//! This module defines the value types the cache serves:
//! - [`InventoryNode`] and [`NodeKind`]: one object of the inventory tree
//! - [`Scope`]: which subtree a cache entry covers
//! - [`ResourceRef`]: an id-or-name reference coming from the UI
//! - [`prune`]: the per-kind attribute allow-lists

pub mod node;
pub mod prune;
pub mod scope;

pub use node::{InventoryNode, NodeKind};
pub use prune::{allowed_attributes, prune, prune_all};
pub use scope::{ResourceRef, Scope, ScopeLevel};
