//! Error types shared by every component of the engine.

use thiserror::Error;

/// Structural problems with imported records. Raised before any mutation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("invalid mass: {0}")]
    InvalidMass(String),

    #[error("priority must be between 0 and 100, got: {0}")]
    InvalidPriority(i64),

    #[error("identifier must not be empty")]
    EmptyId,

    #[error("duplicate identifier: {0}")]
    DuplicateId(String),

    #[error("invalid placement: {0}")]
    InvalidPlacement(String),
}

/// Every failure a command against the engine can report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CargoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "container {container_id} cannot carry {requested:.3} kg more (current {current:.3} kg, limit {limit:.3} kg)"
    )]
    CapacityExceeded {
        container_id: String,
        requested: f64,
        current: f64,
        limit: f64,
    },

    #[error("item {item_id} would overlap another item or leave container {container_id}")]
    Overlap {
        container_id: String,
        item_id: String,
    },

    #[error("item {item_id} has no geometric fit")]
    NoGeometricFit { item_id: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("item {item_id} is not placed")]
    NotPlaced { item_id: String },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("no waste item fits into undocking container {container_id} within {max_weight:.3} kg")]
    NoCapacity {
        container_id: String,
        max_weight: f64,
    },

    #[error("container {container_id} holds nothing to remove")]
    NothingToRemove { container_id: String },

    #[error("plan is stale: item {item_id} is no longer where the plan expects it")]
    StalePlan { item_id: String },
}

impl CargoError {
    pub fn item_not_found(id: impl Into<String>) -> Self {
        CargoError::NotFound {
            entity: "item",
            id: id.into(),
        }
    }

    pub fn container_not_found(id: impl Into<String>) -> Self {
        CargoError::NotFound {
            entity: "container",
            id: id.into(),
        }
    }

    /// Stable machine-readable code, used by the HTTP adapter.
    pub fn code(&self) -> &'static str {
        match self {
            CargoError::Validation(_) => "validation_error",
            CargoError::CapacityExceeded { .. } => "capacity_exceeded",
            CargoError::Overlap { .. } => "overlap",
            CargoError::NoGeometricFit { .. } => "no_geometric_fit",
            CargoError::NotFound { .. } => "not_found",
            CargoError::NotPlaced { .. } => "not_placed",
            CargoError::InvalidRange(_) => "invalid_range",
            CargoError::NoCapacity { .. } => "no_capacity",
            CargoError::NothingToRemove { .. } => "nothing_to_remove",
            CargoError::StalePlan { .. } => "stale_plan",
        }
    }
}

pub type CargoResult<T> = Result<T, CargoError>;
