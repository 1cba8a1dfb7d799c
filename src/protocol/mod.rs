//! # Protocol Engine
//!
//! The correlation and dispatch core: pending-request aggregation with
//! deadlines and synthetic failures, inbound packet routing, and the client
//! event stream.

pub mod correlator;
pub mod dispatcher;
pub mod events;
