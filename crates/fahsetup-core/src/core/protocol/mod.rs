//! # Alchemical Protocol Module
//!
//! Describes how a run drives the coupling parameter `lambda` and how the distributed
//! client integrates the equations of motion.
//!
//! - [`functions`] - The table of context parameters expressed as functions of `lambda`
//! - [`splitting`] - Parsing and validation of Langevin splitting strings
//! - [`nonequilibrium`] - Step counts, timestep and thermostat of the switching protocol
//! - [`integrator`] - The periodic nonequilibrium integrator program built from a protocol
//!
//! The integrator is only *defined* here; its numerics run inside the simulation
//! engine of the distributed client.

pub mod functions;
pub mod integrator;
pub mod nonequilibrium;
pub mod splitting;
