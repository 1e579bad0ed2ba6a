//! # Story World
//!
//! The "World Bible" crate - the authored story graph, the mutable game
//! variables, and the geography used to describe where the player stands.
//! This crate owns data and state; it does not interpret scripts or drive
//! navigation.

pub mod graph;
pub mod locations;
pub mod variables;

pub use graph::*;
pub use locations::*;
pub use variables::*;
