pub mod schema;
pub mod settings;
pub mod storage;

pub use schema::SchemaManager;
pub use settings::{Actuators, Database, Engine, Gateway, GatewayAuth, Notifier, Settings};
pub use storage::Storage;
