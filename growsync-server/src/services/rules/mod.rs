pub mod condition;
pub mod dispatch;
pub mod scheduler;

pub use condition::*;
pub use dispatch::*;
pub use scheduler::*;
