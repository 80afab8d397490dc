//! Lens Core
//!
//! Core types and abstractions for the Lens Navigator research controller.
//!
//! This crate contains:
//! - Domain types: Research requests, job states, results and citations
//! - DTOs: Data transfer objects exchanged with analysis backends
//! - Fingerprinting: Deterministic cache keys derived from requests

pub mod domain;
pub mod dto;
pub mod fingerprint;

pub use fingerprint::Fingerprint;
