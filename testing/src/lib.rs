//! # Callboard Testing
//!
//! Ergonomic testing utilities for callboard reducers.


pub use reducer_test::{ReducerTest, assertions};
