//! Domain records for the stowage engine.
//!
//! - `Container`: a cuboid storage unit with a zone, weight limit and open face
//! - `Item`: a cuboid piece of cargo with mass, priority and lifetime limits
//! - `Placement`: where an item currently is, if anywhere
//!
//! Constructors validate their inputs; placement state is only ever changed
//! by the container index.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::error::ValidationError;
use crate::geometry::Orientation;
use crate::types::validation::{normalize_label, validate_id, validate_mass};
use crate::types::{Axis, Cuboid, Dims, Point3};

pub type ContainerId = String;
pub type ItemId = String;

/// Default priority for items imported without one.
pub const DEFAULT_PRIORITY: u8 = 50;

fn validate_dims(dims: Dims, owner: &str) -> Result<(), ValidationError> {
    if !dims.is_valid() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} dimensions must be positive, got: {}x{}x{}",
            owner, dims.width, dims.depth, dims.height
        )));
    }
    Ok(())
}

/// A storage container.
///
/// The open face lies at coordinate 0 of `retrieval_axis`; items are pulled
/// out through that face.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Container {
    pub id: ContainerId,
    pub zone: String,
    pub dims: Dims,
    pub max_weight: f64,
    pub is_active: bool,
    pub retrieval_axis: Axis,
}

impl Container {
    /// Creates an active container with the default retrieval axis.
    ///
    /// # Examples
    /// ```
    /// use stowplan::model::Container;
    /// use stowplan::types::Dims;
    ///
    /// assert!(Container::new("c-1", "Lab", Dims::new(100, 100, 100), 500.0).is_ok());
    /// assert!(Container::new("c-2", "Lab", Dims::new(0, 100, 100), 500.0).is_err());
    /// ```
    pub fn new(
        id: impl AsRef<str>,
        zone: impl Into<String>,
        dims: Dims,
        max_weight: f64,
    ) -> Result<Self, ValidationError> {
        let id = validate_id(id.as_ref())?;
        validate_dims(dims, "Container")?;
        validate_mass(max_weight, "Container max weight")?;
        let zone: String = zone.into();
        Ok(Self {
            id,
            zone: zone.trim().to_owned(),
            dims,
            max_weight,
            is_active: true,
            retrieval_axis: Axis::default(),
        })
    }

    pub fn with_retrieval_axis(mut self, axis: Axis) -> Self {
        self.retrieval_axis = axis;
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// The container interior as a cuboid at the origin.
    #[inline]
    pub fn bounds(&self) -> Cuboid {
        Cuboid::bounds(self.dims)
    }

    pub fn matches_zone(&self, zone: Option<&str>) -> bool {
        zone.is_some_and(|zone| zone.eq_ignore_ascii_case(&self.zone))
    }
}

/// Where a placed item sits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlacedAt {
    pub container_id: ContainerId,
    #[schema(example = json!({"x": 0, "y": 0, "z": 0}))]
    pub position: Point3,
    pub orientation: Orientation,
}

/// Placement state of an item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Unplaced,
    Placed {
        container_id: ContainerId,
        position: Point3,
        orientation: Orientation,
    },
}

impl Placement {
    pub fn placed_at(&self) -> Option<PlacedAt> {
        match self {
            Placement::Unplaced => None,
            Placement::Placed {
                container_id,
                position,
                orientation,
            } => Some(PlacedAt {
                container_id: container_id.clone(),
                position: *position,
                orientation: *orientation,
            }),
        }
    }

    pub fn container_id(&self) -> Option<&str> {
        match self {
            Placement::Unplaced => None,
            Placement::Placed { container_id, .. } => Some(container_id),
        }
    }
}

impl From<PlacedAt> for Placement {
    fn from(at: PlacedAt) -> Self {
        Placement::Placed {
            container_id: at.container_id,
            position: at.position,
            orientation: at.orientation,
        }
    }
}

/// A piece of cargo.
///
/// # Fields
/// * `dims` - Native extents (width, depth, height) in cm
/// * `mass` - Mass in kg
/// * `priority` - 0 to 100, higher is more important
/// * `usage_limit` - Remaining uses; `None` means unlimited
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub dims: Dims,
    pub mass: f64,
    pub priority: u8,
    pub preferred_zone: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub usage_limit: Option<u32>,
    pub(crate) placement: Placement,
}

impl Item {
    /// Creates an unplaced item with default priority and no limits.
    pub fn new(
        id: impl AsRef<str>,
        name: impl Into<String>,
        dims: Dims,
        mass: f64,
    ) -> Result<Self, ValidationError> {
        let id = validate_id(id.as_ref())?;
        validate_dims(dims, "Item")?;
        validate_mass(mass, "Item mass")?;
        Ok(Self {
            id,
            name: name.into(),
            dims,
            mass,
            priority: DEFAULT_PRIORITY,
            preferred_zone: None,
            expiry_date: None,
            usage_limit: None,
            placement: Placement::Unplaced,
        })
    }

    /// Sets the priority, clamped to 0..=100.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(100);
        self
    }

    pub fn with_preferred_zone(mut self, zone: impl Into<String>) -> Self {
        self.preferred_zone = normalize_label(Some(zone.into()));
        self
    }

    pub fn with_expiry(mut self, date: NaiveDate) -> Self {
        self.expiry_date = Some(date);
        self
    }

    pub fn with_usage_limit(mut self, uses: u32) -> Self {
        self.usage_limit = Some(uses);
        self
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn is_placed(&self) -> bool {
        matches!(self.placement, Placement::Placed { .. })
    }

    pub fn container_id(&self) -> Option<&str> {
        self.placement.container_id()
    }

    /// Space occupied by the item, if placed.
    pub fn footprint(&self) -> Option<Cuboid> {
        match &self.placement {
            Placement::Unplaced => None,
            Placement::Placed {
                position,
                orientation,
                ..
            } => Some(Cuboid::new(*position, orientation.apply(self.dims))),
        }
    }

    /// Expired strictly before `date`.
    pub fn is_expired(&self, date: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < date)
    }

    /// A usage counter exists and has run out.
    pub fn is_usage_exhausted(&self) -> bool {
        self.usage_limit == Some(0)
    }

    /// Expiry ordering key; undated items sort last.
    pub(crate) fn expiry_key(&self) -> NaiveDate {
        self.expiry_date.unwrap_or(NaiveDate::MAX)
    }
}
