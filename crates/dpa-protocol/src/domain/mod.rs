//! # Domain Module
//!
//! Core domain types for the DPA protocol state machine.

pub mod config;
pub mod entities;
pub mod errors;
pub mod frame;
pub mod invariants;
pub mod value_objects;

pub use config::*;
pub use entities::*;
pub use errors::*;
pub use frame::*;
pub use invariants::*;
pub use value_objects::*;
