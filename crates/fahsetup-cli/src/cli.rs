use clap::{Args, Parser, Subcommand};
use fahsetup::engine::config::Phase;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu",
    version,
    about = "fahsetup CLI - Prepares relative alchemical free-energy runs for Folding@Home-style distributed execution.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, relax and serialize the hybrid systems of one transformation into run directories.
    Setup(SetupArgs),
    /// Print the nonequilibrium protocol and core settings derived from a setup file.
    Protocol(ProtocolArgs),
}

/// Options shared by every command that reads a setup file.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the setup file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Set a specific configuration value, overriding the setup file.
    /// Can be used multiple times. Example: -S production.nsteps-neq=50000
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Command-line values that take precedence over the setup file.
#[derive(Args, Debug, Clone, Default)]
pub struct SetupOverrides {
    /// Override the run directory name created under each project's RUNS directory.
    #[arg(short = 't', long, value_name = "NAME")]
    pub trajectory_directory: Option<String>,

    /// Override the index of the initial ligand in the ligand file.
    #[arg(long, value_name = "INT")]
    pub old_ligand: Option<usize>,

    /// Override the index of the final ligand in the ligand file.
    #[arg(long, value_name = "INT")]
    pub new_ligand: Option<usize>,

    /// Restrict the run to the given phase. Can be used multiple times.
    #[arg(short, long = "phase", value_name = "PHASE")]
    pub phases: Vec<Phase>,

    /// Override the collaborator executable that builds and relaxes hybrid systems.
    #[arg(short, long, value_name = "PROGRAM")]
    pub backend: Option<PathBuf>,

    /// Extra argument passed to the collaborator executable. Can be used multiple times.
    #[arg(long = "backend-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub backend_args: Vec<String>,
}

/// Arguments for the `setup` subcommand.
#[derive(Args, Debug)]
pub struct SetupArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub overrides: SetupOverrides,

    /// Directory that holds the project directories.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,
}

/// Arguments for the `protocol` subcommand.
#[derive(Args, Debug)]
pub struct ProtocolArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Also write the integrator definition to this path.
    #[arg(long, value_name = "PATH")]
    pub integrator_xml: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn setup_arguments_are_parsed() {
        let cli = Cli::parse_from([
            "fahsetup",
            "-vv",
            "setup",
            "-c",
            "setup.toml",
            "-o",
            "/data/fah",
            "--phase",
            "solvent",
            "--phase",
            "VACUUM",
            "--old-ligand",
            "2",
            "--backend-arg",
            "--gpu",
            "-S",
            "production.n-cycles=3",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Setup(args) = cli.command else {
            panic!("expected the setup command");
        };
        assert_eq!(args.config.config, PathBuf::from("setup.toml"));
        assert_eq!(args.output, PathBuf::from("/data/fah"));
        assert_eq!(args.overrides.phases, vec![Phase::Solvent, Phase::Vacuum]);
        assert_eq!(args.overrides.old_ligand, Some(2));
        assert_eq!(args.overrides.backend_args, vec!["--gpu"]);
        assert_eq!(args.config.set_values, vec!["production.n-cycles=3"]);
    }

    #[test]
    fn setup_output_defaults_to_current_directory() {
        let cli = Cli::parse_from(["fahsetup", "setup", "-c", "setup.toml"]);
        let Commands::Setup(args) = cli.command else {
            panic!("expected the setup command");
        };
        assert_eq!(args.output, PathBuf::from("."));
        assert!(args.overrides.phases.is_empty());
    }

    #[test]
    fn unknown_phase_is_rejected() {
        let result = Cli::try_parse_from(["fahsetup", "setup", "-c", "s.toml", "-p", "gas"]);
        assert!(result.is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["fahsetup", "-q", "-v", "protocol", "-c", "s.toml"]);
        assert!(result.is_err());
    }
}
