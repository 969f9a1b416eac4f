//! Greenlight API Library
//!
//! A movie catalogue service with user registration. Requests pass a
//! per-client admission gate, writes to versioned resources go through an
//! optimistic concurrency guard, and side work such as email runs on a
//! drained background task pool.

#![forbid(unsafe_code)]

pub mod admission;
pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
