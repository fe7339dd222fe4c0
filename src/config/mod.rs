pub mod loader;
pub mod settings;

pub use loader::load_config;
pub use settings::*;
