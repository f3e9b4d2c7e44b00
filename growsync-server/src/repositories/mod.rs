mod config;
mod rule;

pub use config::ConfigRepository;
pub use rule::RuleRepository;
