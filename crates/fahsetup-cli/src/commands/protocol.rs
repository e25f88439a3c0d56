use crate::cli::{ProtocolArgs, SetupOverrides};
use crate::config::build_config;
use crate::error::{CliError, Result};
use fahsetup::{
    core::io::{core_xml::write_core_xml, openmm::IntegratorXml, traits::Artifact},
    workflows::{self, setup::ProtocolPlan},
};
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub async fn run(args: ProtocolArgs) -> Result<()> {
    let app = build_config(&args.config, &SetupOverrides::default())?;
    let plan = workflows::setup::plan(&app.core_config);

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(render_summary(&plan).as_bytes())?;
    writeln!(stdout)?;
    write_core_xml(&plan.core, &mut stdout)?;
    stdout.flush()?;

    if let Some(path) = &args.integrator_xml {
        write_integrator(&plan, path)?;
        println!("Integrator written to: {}", path.display());
    }

    Ok(())
}

fn write_integrator(plan: &ProtocolPlan, path: &Path) -> Result<()> {
    info!("Writing integrator definition to {:?}", path);
    IntegratorXml(&plan.integrator)
        .write_to_path(path)
        .map_err(|source| CliError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
}

fn render_summary(plan: &ProtocolPlan) -> String {
    let protocol = &plan.protocol;
    let mut out = String::new();
    let _ = writeln!(out, "Nonequilibrium protocol");
    let _ = writeln!(out, "  splitting           : {}", protocol.splitting);
    let _ = writeln!(out, "  timestep            : {} fs", protocol.timestep_fs);
    let _ = writeln!(out, "  temperature         : {} K", protocol.temperature_kelvin);
    let _ = writeln!(
        out,
        "  collision rate      : {} / ps",
        protocol.collision_rate_per_ps
    );
    let _ = writeln!(
        out,
        "  cycle               : {} eq + {} neq + {} eq + {} neq steps ({:.3} ns)",
        protocol.nsteps_eq,
        protocol.nsteps_neq,
        protocol.nsteps_eq,
        protocol.nsteps_neq,
        protocol.cycle_length_ns()
    );
    let _ = writeln!(out, "  cycles              : {}", protocol.n_cycles);
    let _ = writeln!(out, "  total steps         : {}", protocol.total_steps());
    let _ = writeln!(out, "  shadow work         : {}", protocol.measure_shadow_work);
    let _ = writeln!(
        out,
        "  integrator          : {} globals, {} computations",
        plan.integrator.global_variables().len(),
        plan.integrator.computations().len()
    );
    let _ = writeln!(out, "Alchemical functions");
    for (name, expression) in protocol.functions.iter() {
        let _ = writeln!(out, "  {:<28} = {}", name, expression);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fahsetup::engine::config::{SetupConfigBuilder, SystemConfig};

    fn sample_plan() -> ProtocolPlan {
        let config = SetupConfigBuilder::new()
            .ligand_file("ligands.sdf".into())
            .old_ligand_index(0)
            .new_ligand_index(1)
            .complex_project("13400")
            .solvent_project("13401")
            .trajectory_directory("RUN0")
            .system(SystemConfig {
                protein_pdb: Some("receptor.pdb".into()),
                forcefield_files: vec!["amber/ff14SB.xml".to_string()],
                ..Default::default()
            })
            .nsteps_eq(100)
            .nsteps_neq(400)
            .n_cycles(2)
            .build()
            .unwrap();
        workflows::setup::plan(&config)
    }

    #[test]
    fn summary_lists_cycle_and_functions() {
        let summary = render_summary(&sample_plan());

        assert!(summary.contains("splitting           : V R H O R V"));
        assert!(summary.contains("100 eq + 400 neq + 100 eq + 400 neq steps (0.004 ns)"));
        assert!(summary.contains("total steps         : 2000"));
        assert!(summary.contains("lambda_sterics_core"));
        assert_eq!(summary.matches(" = ").count(), 9);
    }

    #[test]
    fn integrator_is_written_to_the_requested_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrator.xml");
        write_integrator(&sample_plan(), &path).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("type=\"CustomIntegrator\""));
    }

    #[test]
    fn unwritable_integrator_path_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("integrator.xml");

        match write_integrator(&sample_plan(), &path) {
            Err(CliError::FileWrite { path: reported, source }) => {
                assert_eq!(reported, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected a write error, got {:?}", other),
        }
    }
}
