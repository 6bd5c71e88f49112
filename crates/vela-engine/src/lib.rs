//! # vela-engine
//!
//! The stateful half of the Vela context engine.
//!
//! - **History**: [`history::ContextHistory`] — linear undo/redo over
//!   immutable snapshots, with pre-edit file restoration
//! - **Task pools**: [`tasks::TaskPools`] — one serialized primary-action
//!   worker plus bounded context-mutation and background pools
//! - **Persistence**: [`store::ContextStore`] trait and the JSON-file
//!   [`store::JsonContextStore`]
//! - **Events**: [`events::EventEmitter`] — broadcast notification of
//!   history changes and task failures
//! - **Summarizer**: [`summarizer::Summarizer`] — the boundary to whatever
//!   produces paste descriptions
//! - **Manager**: [`manager::ContextManager`] — the facade tying it together
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: vela-core.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod events;
pub mod history;
pub mod manager;
pub mod store;
pub mod summarizer;
pub mod tasks;

pub use config::EngineConfig;
pub use errors::EngineError;
pub use events::{EngineEvent, EventEmitter, HistoryChangeKind};
pub use history::{ContextHistory, UndoResult};
pub use manager::ContextManager;
pub use store::{ContextStore, JsonContextStore, StoreError};
pub use summarizer::{Summarizer, TruncatingSummarizer};
pub use tasks::{ActionJob, TaskHandle, TaskOutcome, TaskPools};
