//! Common test utilities and helpers
//!
//! Deterministic collaborators and pipeline builders shared by the
//! integration tests.

#![allow(dead_code)]

pub mod pipeline_helpers;
