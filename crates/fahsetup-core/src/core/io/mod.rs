//! Provides the writers for every artifact of a run directory.
//!
//! Each artifact implements the [`traits::Artifact`] interface, so the workflow can
//! serialize into memory for tests or straight into a file.

pub mod core_xml;
pub mod hybrid;
pub mod npy;
pub mod openmm;
pub mod pdb;
pub mod traits;
pub(crate) mod xml;
