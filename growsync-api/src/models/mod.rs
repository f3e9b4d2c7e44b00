mod action;
mod alert;
mod command;
mod condition;
mod config;
mod rule;
mod sample;
mod status;

pub use action::*;
pub use alert::*;
pub use command::*;
pub use condition::*;
pub use config::*;
pub use rule::*;
pub use sample::*;
pub use status::*;

pub use growsync_analyser::{Aggressiveness, GrowthStage, VpdBand, VpdStatistics};

pub type Id = i32;
