pub mod env;
pub mod environment;
pub mod error;
pub mod params;
pub mod secrets;
pub mod settings;
