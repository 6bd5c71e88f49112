//! # vela-core
//!
//! Foundation types for the Vela context engine.
//!
//! This crate provides the shared vocabulary the engine crate builds on:
//!
//! - **Identities**: [`entity::EntityId`] (code entities) and
//!   [`entity::ProjectFile`] (files relative to a project root)
//! - **Fragments**: [`fragment::PathFragment`], [`fragment::VirtualFragment`],
//!   and the derived [`fragment::AutoContextFragment`]
//! - **Conversation log**: [`log::ConversationLog`], the append-only message
//!   log shared by reference across sibling snapshots
//! - **Snapshots**: [`snapshot::Context`], the immutable versioned unit of
//!   state, and its pure transforms
//! - **Auto-context**: [`autocontext::build`], weighted multi-seed graph
//!   ranking over the snapshot's fragments
//! - **Graph boundary**: [`graph::GraphProvider`] trait plus the in-memory
//!   [`graph::memory::StaticGraph`] used by tests
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `vela-engine`.

#![deny(unsafe_code)]

pub mod autocontext;
pub mod entity;
pub mod errors;
pub mod fragment;
pub mod graph;
pub mod log;
pub mod snapshot;

pub use entity::{EntityId, ProjectFile};
pub use errors::FragmentError;
pub use fragment::{
    AutoContextFragment, PasteDescription, PathFragment, SkeletonEntry, VirtualFragment,
};
pub use graph::{GraphError, GraphProvider};
pub use log::{ConversationLog, HistoryMessage, Role};
pub use snapshot::{Context, ContextEntry};
