mod settings;

pub use settings::{resolve_root_url, ClientConfig, HealthConfig, Settings};
