use super::traits::Artifact;
use super::xml::XmlWriter;
use crate::core::models::state::RelaxedState;
use crate::core::models::system::BoxVectors;
use crate::core::protocol::integrator::CustomIntegrator;
use nalgebra::Vector3;
use std::io::{self, Write};

const SERIALIZATION_VERSION: &str = "1";

/// Edge length of the box the simulation engine assigns to systems without one, in nm.
const DEFAULT_BOX_EDGE_NM: f64 = 2.0;

fn default_box_vectors() -> BoxVectors {
    [
        Vector3::new(DEFAULT_BOX_EDGE_NM, 0.0, 0.0),
        Vector3::new(0.0, DEFAULT_BOX_EDGE_NM, 0.0),
        Vector3::new(0.0, 0.0, DEFAULT_BOX_EDGE_NM),
    ]
}

/// Serialized form of a custom integrator, as read by the simulation engine.
pub struct IntegratorXml<'a>(pub &'a CustomIntegrator);

impl Artifact for IntegratorXml<'_> {
    type Error = io::Error;

    fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let integrator = self.0;
        let mut xml = XmlWriter::new(writer);
        xml.declaration()?;
        xml.start(
            "Integrator",
            &[
                ("constraintTolerance", integrator.constraint_tolerance.to_string()),
                ("kineticEnergy", integrator.kinetic_energy.clone()),
                ("randomSeed", integrator.random_seed.to_string()),
                ("stepSize", integrator.step_size_ps.to_string()),
                ("type", "CustomIntegrator".to_string()),
                ("version", SERIALIZATION_VERSION.to_string()),
            ],
        )?;

        let mut globals: Vec<(&str, String)> = integrator
            .global_variables()
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_string()))
            .collect();
        globals.sort_by(|a, b| a.0.cmp(b.0));
        xml.empty("GlobalVariables", &globals)?;

        xml.start("PerDofVariables", &[])?;
        for name in integrator.per_dof_variables() {
            xml.empty(name, &[])?;
        }
        xml.end()?;

        xml.start("Computations", &[])?;
        for computation in integrator.computations() {
            xml.empty(
                "Computation",
                &[
                    ("computationExpression", computation.expression().to_string()),
                    ("computationType", computation.type_code().to_string()),
                    ("computationVariable", computation.variable().to_string()),
                ],
            )?;
        }
        xml.end()?;

        xml.finish()
    }
}

fn vector_attributes(v: &Vector3<f64>) -> [(&'static str, String); 3] {
    [("x", v.x.to_string()), ("y", v.y.to_string()), ("z", v.z.to_string())]
}

fn write_box<W: Write>(xml: &mut XmlWriter<'_, W>, box_vectors: &BoxVectors) -> io::Result<()> {
    xml.start("PeriodicBoxVectors", &[])?;
    for (label, vector) in ["A", "B", "C"].iter().zip(box_vectors.iter()) {
        xml.empty(label, &vector_attributes(vector))?;
    }
    xml.end()
}

fn write_vectors<W: Write>(
    xml: &mut XmlWriter<'_, W>,
    section: &str,
    item: &str,
    vectors: impl Iterator<Item = Vector3<f64>>,
) -> io::Result<()> {
    xml.start(section, &[])?;
    for v in vectors {
        xml.empty(item, &vector_attributes(&v))?;
    }
    xml.end()
}

/// Serialized form of a relaxed simulation state (positions, velocities, forces,
/// energies, parameters and box vectors).
///
/// Every state carries `PeriodicBoxVectors`. A state without box vectors gets the
/// engine's default 2 nm cubic box.
pub struct StateXml<'a>(pub &'a RelaxedState);

impl Artifact for StateXml<'_> {
    type Error = io::Error;

    fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let state = self.0;
        let mut xml = XmlWriter::new(writer);
        xml.declaration()?;
        xml.start(
            "State",
            &[
                ("time", state.time_ps.to_string()),
                ("type", "State".to_string()),
                ("version", SERIALIZATION_VERSION.to_string()),
            ],
        )?;

        let box_vectors = state.box_vectors.unwrap_or_else(default_box_vectors);
        write_box(&mut xml, &box_vectors)?;

        xml.empty(
            "Energies",
            &[
                ("KineticEnergy", state.kinetic_energy.to_string()),
                ("PotentialEnergy", state.potential_energy.to_string()),
            ],
        )?;

        let parameters: Vec<(&str, String)> = state
            .parameters
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_string()))
            .collect();
        xml.empty("Parameters", &parameters)?;

        write_vectors(
            &mut xml,
            "Positions",
            "Position",
            state.positions.iter().map(|p| p.coords),
        )?;
        write_vectors(
            &mut xml,
            "Velocities",
            "Velocity",
            state.velocities.iter().copied(),
        )?;
        write_vectors(&mut xml, "Forces", "Force", state.forces.iter().copied())?;

        xml.finish()
    }
}

/// Writes `integrator` as an OpenMM `CustomIntegrator` document.
pub fn write_integrator_xml(
    integrator: &CustomIntegrator,
    writer: &mut impl Write,
) -> io::Result<()> {
    IntegratorXml(integrator).write_to(writer)
}

/// Writes `state` as an OpenMM `State` document.
pub fn write_state_xml(state: &RelaxedState, writer: &mut impl Write) -> io::Result<()> {
    StateXml(state).write_to(writer)
}
