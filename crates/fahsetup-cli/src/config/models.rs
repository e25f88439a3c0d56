use fahsetup::engine::backend::process::ProcessBackend;
use fahsetup::engine::config as core_config;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl BackendCommand {
    pub fn to_process_backend(&self) -> ProcessBackend {
        ProcessBackend::new(self.program.clone(), self.args.clone())
    }
}

pub struct AppConfig {
    pub backend: BackendCommand,
    pub core_config: core_config::SetupConfig,
}
