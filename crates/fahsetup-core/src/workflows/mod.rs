//! # Workflows Module
//!
//! High-level entry points that sequence the collaborators and writers.
//!
//! - **Setup Workflow** ([`setup`]) - Prepares run directories, obtains the hybrid
//!   systems and writes every artifact for each phase. Its [`setup::plan`] function
//!   derives the integrator and `core.xml` parameters on their own.

pub mod setup;
