//! Spatial cargo stowage: placement, retrieval planning, rearrangement,
//! waste return and a simulated clock over a set of storage containers.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod import;
pub mod index;
pub mod logging;
pub mod model;
pub mod planner;
pub mod query;
pub mod rearrangement;
pub mod retrieval;
pub mod simulation;
pub mod types;
pub mod waste;

pub use engine::Engine;
pub use error::{CargoError, CargoResult, ValidationError};
