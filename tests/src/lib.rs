//! # Payment Connector Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/   # Connector scenarios against the mock daemon
//! └── benches/           # Coin selection and weight estimation
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p connector-tests
//! cargo bench -p connector-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
