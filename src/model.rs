//! Data models for container load planning.
//!
//! This module defines the fundamental data structures of a planning run:
//! - `CargoItem`: a single unit of cargo, expanded from an input row
//! - `ContainerKind` / `ContainerType`: the fixed catalog of shipping containers
//! - `Container`: a container opened during a run, with its assigned items

use std::fmt;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::types::Dims;

/// Validation error for catalog and item data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
}

fn validate_dims(dims: Dims, what: &str) -> Result<(), ValidationError> {
    if !dims.is_valid() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive and finite on every axis, got: {:?}",
            what, dims
        )));
    }
    Ok(())
}

/// A single unit of cargo.
///
/// Many items share one `source_row_id` when the row's quantity is greater than one.
///
/// # Fields
/// * `id` - Unique per unit, `item-<row>-<ordinal>`
/// * `source_row_id` - Identifier of the originating input row
/// * `dimensions_mm` - (length, width, height) in millimetres
/// * `volume_mm3` - Exact product of the three dimensions
/// * `color` - Display color (hex), ignored by the planner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CargoItem {
    pub id: String,
    pub source_row_id: String,
    #[schema(value_type = [f64; 3], example = json!([1000.0, 500.0, 500.0]))]
    pub dimensions_mm: Dims,
    pub volume_mm3: f64,
    pub color: String,
}

impl CargoItem {
    /// Creates a new cargo item with validation.
    ///
    /// The volume is derived from the dimensions and never supplied by the caller.
    pub fn new(
        id: impl Into<String>,
        source_row_id: impl Into<String>,
        dimensions_mm: Dims,
        color: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        validate_dims(dimensions_mm, "Item dimensions")?;
        Ok(Self {
            id: id.into(),
            source_row_id: source_row_id.into(),
            volume_mm3: dimensions_mm.volume(),
            dimensions_mm,
            color: color.into(),
        })
    }
}

/// Code of a container type in the fixed catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum ContainerKind {
    /// Standard 20-foot dry van.
    #[serde(rename = "20DV")]
    TwentyDv,
    /// 40-foot high cube.
    #[serde(rename = "40HC")]
    FortyHc,
    /// 40-foot flat rack, modelled as a rectangular box.
    #[serde(rename = "40FR")]
    FortyFr,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 3] = [
        ContainerKind::TwentyDv,
        ContainerKind::FortyHc,
        ContainerKind::FortyFr,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            ContainerKind::TwentyDv => "20DV",
            ContainerKind::FortyHc => "40HC",
            ContainerKind::FortyFr => "40FR",
        }
    }

    /// Catalog entry for this kind.
    pub fn spec(self) -> &'static ContainerType {
        match self {
            ContainerKind::TwentyDv => &CATALOG[0],
            ContainerKind::FortyHc => &CATALOG[1],
            ContainerKind::FortyFr => &CATALOG[2],
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Static description of a container type.
///
/// `max_volume_mm3` is the nominal usable volume and is taken as given rather
/// than recomputed from `max_dimensions_mm`.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerType {
    pub code: ContainerKind,
    #[schema(value_type = [f64; 3], example = json!([5898.0, 2352.0, 2393.0]))]
    pub max_dimensions_mm: Dims,
    pub max_volume_mm3: f64,
    #[schema(value_type = String)]
    pub display_label: &'static str,
}

impl ContainerType {
    /// Checks if the item fits on every axis, without rotation.
    pub fn fits_dimensions(&self, item: &CargoItem) -> bool {
        item.dimensions_mm.fits_within(&self.max_dimensions_mm)
    }

    /// Volume ceiling for appending to an existing container.
    pub fn volume_cap(&self, packing_efficiency: f64) -> f64 {
        self.max_volume_mm3 * packing_efficiency
    }
}

/// Fixed container catalog, internal dimensions in millimetres.
pub static CATALOG: [ContainerType; 3] = [
    ContainerType {
        code: ContainerKind::TwentyDv,
        max_dimensions_mm: Dims::new(5898.0, 2352.0, 2393.0),
        max_volume_mm3: 33_200_000_000.0,
        display_label: "20' DV",
    },
    ContainerType {
        code: ContainerKind::FortyHc,
        max_dimensions_mm: Dims::new(12032.0, 2352.0, 2698.0),
        max_volume_mm3: 76_400_000_000.0,
        display_label: "40' HC",
    },
    ContainerType {
        code: ContainerKind::FortyFr,
        max_dimensions_mm: Dims::new(11650.0, 2400.0, 3000.0),
        max_volume_mm3: 83_880_000_000.0,
        display_label: "40' FR",
    },
];

/// A container opened during one planning run.
///
/// # Fields
/// * `sequence_id` - Type code plus 1-based ordinal among containers of that type
/// * `kind` - Container type code
/// * `items` - Assigned items, in assignment order
/// * `used_volume_mm3` - Sum of the volumes of `items`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub sequence_id: String,
    #[serde(rename = "type")]
    pub kind: ContainerKind,
    pub items: Vec<CargoItem>,
    pub used_volume_mm3: f64,
}

impl Container {
    /// Opens a container with `first` as its sole occupant.
    ///
    /// The efficiency cap is not checked here, so a single oversized item may
    /// exceed it.
    pub fn open(kind: ContainerKind, ordinal: usize, first: CargoItem) -> Self {
        Self {
            sequence_id: format!("{}-{}", kind.code(), ordinal),
            kind,
            used_volume_mm3: first.volume_mm3,
            items: vec![first],
        }
    }

    pub fn spec(&self) -> &'static ContainerType {
        self.kind.spec()
    }

    /// Checks if `item` may be appended: it must fit dimensionally and keep the
    /// used volume at or below the efficiency cap.
    pub fn accepts(&self, item: &CargoItem, packing_efficiency: f64) -> bool {
        let spec = self.spec();
        spec.fits_dimensions(item)
            && self.used_volume_mm3 + item.volume_mm3 <= spec.volume_cap(packing_efficiency)
    }

    pub fn push(&mut self, item: CargoItem) {
        self.used_volume_mm3 += item.volume_mm3;
        self.items.push(item);
    }

    /// True when the opening item is larger than the type's internal dimensions.
    ///
    /// Only the opening item can cause this, appended items are always checked.
    pub fn is_dimension_overflow(&self) -> bool {
        self.items
            .first()
            .is_some_and(|first| !self.spec().fits_dimensions(first))
    }

    /// Used volume relative to the nominal container volume, in percent.
    pub fn utilization_percent(&self) -> f64 {
        let total = self.spec().max_volume_mm3;
        if total <= 0.0 {
            return 0.0;
        }
        (self.used_volume_mm3 / total) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, dims: Dims) -> CargoItem {
        CargoItem::new(id, "0", dims, "#FFadad").unwrap()
    }

    #[test]
    fn cargo_item_derives_volume() {
        let it = item("item-0-0", Dims::new(1000.0, 500.0, 500.0));
        assert_eq!(it.volume_mm3, 250_000_000.0);
    }

    #[test]
    fn cargo_item_rejects_non_positive_dims() {
        let err = CargoItem::new("x", "0", Dims::new(0.0, 1.0, 1.0), "#fff").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDimension(_)));
    }

    #[test]
    fn catalog_is_keyed_by_kind() {
        for kind in ContainerKind::ALL {
            assert_eq!(kind.spec().code, kind);
        }
        assert_eq!(ContainerKind::FortyHc.spec().max_dimensions_mm.length, 12032.0);
    }

    #[test]
    fn container_tracks_used_volume() {
        let mut cont = Container::open(
            ContainerKind::TwentyDv,
            2,
            item("a", Dims::new(1000.0, 1000.0, 1000.0)),
        );
        cont.push(item("b", Dims::new(1000.0, 500.0, 500.0)));

        assert_eq!(cont.sequence_id, "20DV-2");
        let sum: f64 = cont.items.iter().map(|i| i.volume_mm3).sum();
        assert_eq!(cont.used_volume_mm3, sum);
    }

    #[test]
    fn container_refuses_items_over_cap_or_oversized() {
        let cont = Container::open(
            ContainerKind::TwentyDv,
            1,
            item("a", Dims::new(5000.0, 2000.0, 2000.0)),
        );
        // 20e9 + 20e9 > 33.2e9 * 0.95
        assert!(!cont.accepts(&item("b", Dims::new(5000.0, 2000.0, 2000.0)), 0.95));
        assert!(cont.accepts(&item("c", Dims::new(1000.0, 1000.0, 1000.0)), 0.95));
        assert!(!cont.accepts(&item("d", Dims::new(6000.0, 10.0, 10.0)), 0.95));
    }

    #[test]
    fn container_serializes_type_code() {
        let cont = Container::open(
            ContainerKind::FortyFr,
            1,
            item("a", Dims::new(13000.0, 2000.0, 2000.0)),
        );
        assert!(cont.is_dimension_overflow());
        let value = serde_json::to_value(&cont).unwrap();
        assert_eq!(value["type"], "40FR");
        assert_eq!(value["sequenceId"], "40FR-1");
        assert_eq!(value["items"][0]["sourceRowId"], "0");
    }
}
