//! # fahsetup Core Library
//!
//! Preparation of relative alchemical free-energy calculations for distributed,
//! Folding@Home-style execution. For each requested phase (`complex`, `solvent`,
//! `vacuum`) the library obtains a hybrid system spanning two ligand end-states,
//! defines a periodic nonequilibrium switching protocol, relaxes the starting
//! structure, and writes every artifact the distributed simulation client consumes
//! into a fixed per-run directory layout.
//!
//! ## Architectural Philosophy
//!
//! The library mirrors a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`HybridSystem`,
//!   `HybridTopology`, `RelaxedState`), the alchemical protocol (function table,
//!   splitting strings, the nonequilibrium integrator definition) and the file
//!   writers (`.npy`/`.npz`, PDB, OpenMM XML, `core.xml`).
//!
//! - **[`engine`]: The Orchestration Layer.** Validated configuration, error types,
//!   progress reporting, the run directory layout, and the collaborator traits through
//!   which hybrid-topology construction, structure relaxation and atom-map rendering
//!   are delegated to external tooling.
//!
//! - **[`workflows`]: The Public API.** The `setup` workflow that sequences the
//!   collaborators and writers into a complete run.

pub mod core;
pub mod engine;
pub mod workflows;
