mod engine_config;
mod rule;

pub use engine_config::{EngineConfig, EngineConfigTable};
pub use rule::{RuleRecord, RuleTable};

pub trait Table: Send + Sync {
    /// The name of the table
    fn name(&self) -> &'static str;

    /// The SQL statement to create the table
    fn create(&self) -> String;

    /// The SQL statement to dispose the table
    fn dispose(&self) -> String;

    /// The dependencies of the table
    fn dependencies(&self) -> Vec<&'static str>;
}
