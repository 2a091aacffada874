//! In-memory stand-in for the HFL monitoring backend.
//!
//! Serves the backend's REST and WebSocket surface from process memory and
//! can script a hierarchical training run against itself. Doubles as the
//! in-process fixture for the client-side integration tests.

pub mod generator;
pub mod server;
pub mod state;

pub use generator::{GeneratorConfig, RoundGenerator};
pub use server::SimServer;
pub use state::{SimError, SimExperiment, SimStore};
