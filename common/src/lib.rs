//! knm Common Types
//!
//! Shared types used across the knm workspace: currency codes, the pair
//! records returned to HTTP clients, rounding policies and time helpers.

pub mod monetary;
pub mod rounding;
pub mod time;

pub use monetary::*;
pub use rounding::*;
pub use time::*;
