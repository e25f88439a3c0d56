//! # Engine Module
//!
//! Everything between the stateless core and the setup workflow: validated
//! configuration, error types, progress reporting, the output directory convention
//! and the collaborators that perform the chemistry.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Ligand selection, phases, system, mapping, relaxation and production settings
//! - **Layout** ([`layout`]) - `{projid}/RUNS/{trajectory_directory}` directories and artifact file names
//! - **Collaborators** ([`backend`]) - Hybrid factory, structure relaxation and atom-map rendering
//! - **Progress Monitoring** ([`progress`]) - Progress reporting and user feedback mechanisms
//! - **Error Handling** ([`error`]) - Engine-specific error types and error propagation

pub mod backend;
pub mod config;
pub mod error;
pub mod layout;
pub mod progress;
