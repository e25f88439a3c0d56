use fahsetup::core::protocol::functions::AlchemicalFunctions;
use fahsetup::engine::config::{MappingConfig, SystemConfig};

pub struct DefaultsConfig {
    pub backend_command: String,
    pub system: SystemConfig,
    pub mapping: MappingConfig,
    pub functions: AlchemicalFunctions,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            backend_command: "fahsetup-perses".to_string(),
            system: SystemConfig::default(),
            mapping: MappingConfig::default(),
            functions: AlchemicalFunctions::default(),
        }
    }
}
