//! # Story Runtime
//!
//! Plays a story graph from `story_world`. This crate interprets scripts and
//! conditions, drives navigation between nodes, and saves and restores
//! progress.
//!
//! ## Core Components
//!
//! - **script**: Text interpolation, the restricted condition grammar and event dispatch
//! - **manager**: The Story Manager state machine (transitions and choice resolution)
//! - **save**: Snapshots of a session, persisted as base64-encoded JSON
//! - **config**: Engine settings loaded from TOML
//!
//! ## Design Philosophy
//!
//! - **Degrade, don't throw**: A malformed choice or script is logged and skipped so the rest of the story stays reachable
//! - **Single session**: One manager per player; callers serialize access
//! - **Closed vocabulary**: Every authored event shape is normalized into one enum before dispatch

pub mod config;
pub mod manager;
pub mod save;
pub mod script;

pub use config::*;
pub use manager::*;
pub use save::*;
pub use script::*;
