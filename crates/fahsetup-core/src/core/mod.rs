//! # Core Module
//!
//! Stateless building blocks for alchemical run preparation.
//!
//! ## Architecture
//!
//! - **Hybrid System Representation** ([`models`]) - Hybrid topology, atom classes,
//!   ligand atom maps, relaxed states and run references
//! - **Alchemical Protocol** ([`protocol`]) - Interpolation function table, integrator
//!   splitting strings and the periodic nonequilibrium integrator definition
//! - **File I/O** ([`io`]) - Writers for every artifact in a run directory
//!
//! Nothing in this module touches collaborators or decides where files go; the
//! [`crate::engine`] layer owns those concerns.

pub mod io;
pub mod models;
pub mod protocol;
