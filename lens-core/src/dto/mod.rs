//! Data Transfer Objects for backend communication
//!
//! This module contains DTOs exchanged between the research controller and
//! analysis backends. Backend clients translate these into their own wire
//! formats.

pub mod job;
