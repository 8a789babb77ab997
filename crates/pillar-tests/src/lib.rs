//! Integration test suite for the Pillar wallet engine.
//!
//! Tests here exercise the crates together: fixed reference vectors, full
//! send flows against mock indexer and node servers, and property tests for
//! coin selection and connection key partitioning.

pub mod helpers;
