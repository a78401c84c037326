//! # Segment BERT
//!
//! RoBERTa with part-of-speech segment embeddings, its task heads and a hub-style inference
//! interface, built on Burn.
#![forbid(unsafe_code)]

/// Errors
pub mod error;

/// Models
pub mod models;

/// Tasks and their dictionaries
pub mod tasks;

/// Checkpoint loading and inference
pub mod hub;

/// Utilities
pub mod utils;

pub use error::{Error, Result};

/// Error macros
#[macro_use]
extern crate anyhow;
