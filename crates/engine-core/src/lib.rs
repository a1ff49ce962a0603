pub mod connectors;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod state;
pub mod window;

#[cfg(any(test, feature = "testing"))]
pub mod fakes;
