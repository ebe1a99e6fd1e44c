//! Core domain types for the SOC case-enrichment platform.
//!
//! ## Key types
//!
//! - [`AuditEvent`] / [`Signature`] — the hash-chained, optionally-signed audit log record.
//! - [`MerkleTree`] — integrity verification over a case's audit steps.
//! - [`Case`], [`Entity`], [`Detection`] — the core data model (§3 of the specification).
//! - [`SocError`] — the error taxonomy shared by every crate above the store adapters.
//!
//! ```rust
//! use soc_core::{MerkleTree, Hash};
//!
//! let leaves = vec![
//!     ("step1".to_string(), Hash::digest(b"step 1")),
//!     ("step2".to_string(), Hash::digest(b"step 2")),
//! ];
//! let tree = MerkleTree::from_leaves(leaves);
//! assert!(tree.root_hash().is_some());
//! ```

pub mod audit;
pub mod entities;
pub mod error;
pub mod merkle;

pub use audit::{ActorType, AgentIdentity, AuditEvent, AuditEventType, HashParams, Signature, TokenUsage};
pub use entities::{
    Approval, ApprovalStatus, AutonomyLevel, Case, CaseStatus, Detection, EligibleDetection,
    Entity, EntityBag, EntityType, KnowledgeItem, PromptVersion,
};
pub use error::SocError;
pub use merkle::{Hash, MerkleNode, MerkleTree};
