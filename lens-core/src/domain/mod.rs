//! Core domain types
//!
//! This module contains the core domain structures used across Lens services.
//! These types are shared between the backend clients (which produce them from
//! wire responses) and the research controller (which drives their lifecycle).

pub mod collection;
pub mod job;
pub mod request;
