//! # Integration Scenarios
//!
//! The connector wired to the mock daemon, the in-memory stores and a
//! recording metrics sink.

pub mod flows;
