//! Settings and platform paths for the Pony artwork core

pub mod paths;
pub mod settings;

pub use paths::PathManager;
pub use settings::Settings;
