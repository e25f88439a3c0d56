//! # Core Models Module
//!
//! Data structures describing what the collaborators hand back and what the writers
//! serialize.
//!
//! ## Key Components
//!
//! - [`phase`] - The thermodynamic legs (`complex`, `solvent`, `vacuum`)
//! - [`atom`] - Hybrid atoms and their alchemical classification
//! - [`topology`] - Hybrid atom/bond listing and solvent stripping
//! - [`system`] - A complete hybrid system for one phase, with invariant checks
//! - [`state`] - Relaxed positions, velocities, forces and energies
//! - [`mapping`] - Ligand end-states and the atom map between them
//! - [`references`] - Per-run provenance record

pub mod atom;
pub mod mapping;
pub mod phase;
pub mod references;
pub mod state;
pub mod system;
pub mod topology;
