use super::traits::Artifact;
use super::xml::XmlWriter;
use crate::core::protocol::nonequilibrium::NonequilibriumProtocol;
use std::io::{self, Write};

/// Trajectory snapshots are written once per this many picoseconds.
pub const XTC_INTERVAL_PS: u64 = 1000;

/// Run parameters read by the distributed computing core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreParameters {
    pub num_steps: u64,
    pub xtc_freq: u64,
    pub xtc_atoms: String,
    pub precision: String,
    pub global_var_filename: String,
    pub global_var_freq: u64,
}

impl CoreParameters {
    /// Derives the core parameters for a protocol: every cycle is simulated, one
    /// trajectory frame is kept per nanosecond and the integrator globals are
    /// logged once per picosecond.
    pub fn from_protocol(protocol: &NonequilibriumProtocol) -> Self {
        let steps_per_ps = protocol.steps_per_ps();
        Self {
            num_steps: protocol.total_steps(),
            xtc_freq: XTC_INTERVAL_PS * steps_per_ps,
            xtc_atoms: "solute".to_string(),
            precision: "mixed".to_string(),
            global_var_filename: "globals.csv".to_string(),
            global_var_freq: steps_per_ps,
        }
    }
}

impl Artifact for CoreParameters {
    type Error = io::Error;

    fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let mut xml = XmlWriter::new(writer);
        xml.declaration()?;
        xml.start("config", &[])?;
        xml.text("numSteps", &self.num_steps.to_string())?;
        xml.text("xtcFreq", &self.xtc_freq.to_string())?;
        xml.text("xtcAtoms", &self.xtc_atoms)?;
        xml.text("precision", &self.precision)?;
        xml.text("globalVarFilename", &self.global_var_filename)?;
        xml.text("globalVarFreq", &self.global_var_freq.to_string())?;
        xml.finish()
    }
}

pub fn write_core_xml(parameters: &CoreParameters, writer: &mut impl Write) -> io::Result<()> {
    parameters.write_to(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::nonequilibrium::tests::default_protocol;

    #[test]
    fn default_protocol_yields_expected_parameters() {
        let params = CoreParameters::from_protocol(&default_protocol());
        assert_eq!(params.num_steps, 1_000_000);
        assert_eq!(params.xtc_freq, 250_000);
        assert_eq!(params.global_var_freq, 250);
        assert_eq!(params.xtc_atoms, "solute");
        assert_eq!(params.precision, "mixed");
    }

    #[test]
    fn num_steps_scales_with_cycles() {
        let protocol = NonequilibriumProtocol {
            nsteps_eq: 100,
            nsteps_neq: 400,
            n_cycles: 5,
            ..default_protocol()
        };
        assert_eq!(CoreParameters::from_protocol(&protocol).num_steps, 5_000);
    }

    #[test]
    fn document_matches_pretty_printed_layout() {
        let params = CoreParameters::from_protocol(&default_protocol());
        let mut buf = Vec::new();
        write_core_xml(&params, &mut buf).unwrap();

        let expected = "<?xml version=\"1.0\" ?>\n\
                        <config>\n\
                        \t<numSteps>1000000</numSteps>\n\
                        \t<xtcFreq>250000</xtcFreq>\n\
                        \t<xtcAtoms>solute</xtcAtoms>\n\
                        \t<precision>mixed</precision>\n\
                        \t<globalVarFilename>globals.csv</globalVarFilename>\n\
                        \t<globalVarFreq>250</globalVarFreq>\n\
                        </config>\n";
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }
}
