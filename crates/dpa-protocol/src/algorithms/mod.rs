//! # Algorithms Module
//!
//! Timing arithmetic and the phase transition function.

pub mod timing;
pub mod transitions;

pub use timing::{
    after_confirmation_budget, after_response_budget, confirmation_budget, request_routing_time,
    response_budget, routing_time, timeslot_for_length,
};
pub use transitions::PhaseTracker;
