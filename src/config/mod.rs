pub mod paths;
pub mod settings;

pub use settings::{AppConfig, PoolSettings, ShellSettings, SshDefaults};
