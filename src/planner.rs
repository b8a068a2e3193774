//! Container assignment engine.
//!
//! Maps a list of cargo rows onto shipping containers with a greedy heuristic:
//! - Expansion of every row into single units (quantity flattening, unit conversion)
//! - Stable sort by volume, largest first
//! - First-fit into already opened containers, in opening order
//! - A fixed decision table picks the type of every newly opened container
//!
//! The engine is a pure function of its input and the static catalog. It never
//! moves an item once placed and never tries to minimise the container count.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::str::Chars;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::model::{CargoItem, Container, ContainerKind};
use crate::types::{Dims, LengthUnit, parse_leading_f64, parse_leading_int};

/// Configuration for the planning run.
#[derive(Copy, Clone, Debug)]
pub struct PlanningConfig {
    /// Share of the nominal container volume that may be filled when appending (0.0 to 1.0]
    pub packing_efficiency: f64,
    /// Upper bound on the number of expanded units per run
    pub max_units: usize,
}

impl PlanningConfig {
    pub const DEFAULT_PACKING_EFFICIENCY: f64 = 0.95;
    pub const DEFAULT_MAX_UNITS: usize = 100_000;

    /// Creates a builder for custom configuration.
    pub fn builder() -> PlanningConfigBuilder {
        PlanningConfigBuilder::default()
    }
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            packing_efficiency: Self::DEFAULT_PACKING_EFFICIENCY,
            max_units: Self::DEFAULT_MAX_UNITS,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlanningConfigBuilder {
    config: PlanningConfig,
}

impl PlanningConfigBuilder {
    pub fn packing_efficiency(mut self, ratio: f64) -> Self {
        self.config.packing_efficiency = ratio;
        self
    }

    pub fn max_units(mut self, limit: usize) -> Self {
        self.config.max_units = limit;
        self
    }

    pub fn build(self) -> PlanningConfig {
        self.config
    }
}

/// Errors that stop a planning run before any container is opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanningError {
    #[error("No valid items found to plan")]
    NoValidItems,
    #[error("Too many units: the rows expand to more than {limit} items")]
    TooManyItems { limit: usize },
}

/// One input row from the row editor.
///
/// Numeric fields stay raw; malformed or non-positive values exclude the row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "rowId": "0",
    "lengthRaw": "1000",
    "widthRaw": "500",
    "heightRaw": "500",
    "quantityRaw": "2",
    "unit": "mm",
    "colorHex": "#FFadad"
}))]
pub struct RowInput {
    pub row_id: String,
    #[serde(default)]
    pub length_raw: String,
    #[serde(default)]
    pub width_raw: String,
    #[serde(default)]
    pub height_raw: String,
    #[serde(default)]
    pub quantity_raw: String,
    #[serde(default)]
    pub unit: LengthUnit,
    #[serde(default)]
    pub color_hex: String,
}

impl RowInput {
    /// Returns the row's dimensions in millimetres and its quantity, or `None`
    /// if any of them is missing or not strictly positive.
    fn parsed(&self) -> Option<(Dims, u64)> {
        let length = parse_leading_f64(&self.length_raw).unwrap_or(0.0);
        let width = parse_leading_f64(&self.width_raw).unwrap_or(0.0);
        let height = parse_leading_f64(&self.height_raw).unwrap_or(0.0);
        let quantity = parse_leading_int(&self.quantity_raw).unwrap_or(0);

        if !(length > 0.0 && width > 0.0 && height > 0.0 && quantity > 0) {
            return None;
        }

        let dims = Dims::new(length, width, height).scaled(self.unit.mm_factor());
        if !dims.is_valid() {
            return None;
        }
        Some((dims, quantity as u64))
    }
}

/// Number of containers per type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContainerCounts {
    #[serde(rename = "20DV")]
    pub twenty_dv: usize,
    #[serde(rename = "40HC")]
    pub forty_hc: usize,
    #[serde(rename = "40FR")]
    pub forty_fr: usize,
}

impl ContainerCounts {
    pub fn get(&self, kind: ContainerKind) -> usize {
        match kind {
            ContainerKind::TwentyDv => self.twenty_dv,
            ContainerKind::FortyHc => self.forty_hc,
            ContainerKind::FortyFr => self.forty_fr,
        }
    }

    fn increment(&mut self, kind: ContainerKind) {
        match kind {
            ContainerKind::TwentyDv => self.twenty_dv += 1,
            ContainerKind::FortyHc => self.forty_hc += 1,
            ContainerKind::FortyFr => self.forty_fr += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.twenty_dv + self.forty_hc + self.forty_fr
    }
}

/// Output of one planning run.
///
/// This is also the persisted snapshot format: a stored result is reloaded
/// verbatim and never recomputed.
///
/// # Fields
/// * `counts_by_type` - Number of containers per type
/// * `containers` - Containers sorted by sequence id (natural order)
/// * `row_assignments` - Row id to the sequence ids holding at least one of its units
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanningResult {
    pub counts_by_type: ContainerCounts,
    pub containers: Vec<Container>,
    pub row_assignments: BTreeMap<String, Vec<String>>,
}

/// Aggregated figures for a planning result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub container_count: usize,
    pub item_count: usize,
    pub oversized_count: usize,
    pub average_utilization: f64,
}

impl PlanningResult {
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn item_count(&self) -> usize {
        self.containers.iter().map(|c| c.items.len()).sum()
    }

    /// Containers whose opening item exceeds the type's internal dimensions.
    pub fn oversized_count(&self) -> usize {
        self.containers
            .iter()
            .filter(|c| c.is_dimension_overflow())
            .count()
    }

    /// Average utilization of all containers in percent.
    pub fn average_utilization(&self) -> f64 {
        if self.containers.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .containers
            .iter()
            .map(|c| c.utilization_percent())
            .sum();
        sum / self.containers.len() as f64
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            container_count: self.container_count(),
            item_count: self.item_count(),
            oversized_count: self.oversized_count(),
            average_utilization: self.average_utilization(),
        }
    }

    /// Label shown next to an input row: the container ids joined with `,`,
    /// or the first id followed by `...` when the row spans more than two.
    pub fn row_label(&self, row_id: &str) -> Option<String> {
        let ids = self.row_assignments.get(row_id)?;
        if ids.is_empty() {
            return None;
        }
        if ids.len() > 2 {
            Some(format!("{}...", ids[0]))
        } else {
            Some(ids.join(","))
        }
    }
}

/// Events emitted during a run, for live visualisation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum PlanEvent {
    /// A new container was opened with `item_id` as its first occupant.
    ContainerOpened {
        sequence_id: String,
        kind: ContainerKind,
        item_id: String,
        used_volume_mm3: f64,
    },
    /// An item was appended to an existing container.
    ItemAssigned {
        sequence_id: String,
        item_id: String,
        used_volume_mm3: f64,
    },
    Finished { containers: usize, items: usize },
}

/// Flattens rows into single units, in row order and unit order.
///
/// Item ids are built from the row's position in `rows`, so they stay unique
/// even when callers repeat a row id. Rows with a missing or non-positive
/// dimension or quantity are skipped.
pub fn expand_rows(
    rows: &[RowInput],
    config: &PlanningConfig,
) -> Result<Vec<CargoItem>, PlanningError> {
    let mut accepted = Vec::with_capacity(rows.len());
    let mut total_units: u64 = 0;

    for (position, row) in rows.iter().enumerate() {
        match row.parsed() {
            Some((dims, quantity)) => {
                total_units = total_units.saturating_add(quantity);
                if total_units > config.max_units as u64 {
                    return Err(PlanningError::TooManyItems {
                        limit: config.max_units,
                    });
                }
                accepted.push((position, row, dims, quantity));
            }
            None => tracing::debug!(row_id = %row.row_id, "skipping row without valid dimensions"),
        }
    }

    let mut items = Vec::with_capacity(total_units as usize);
    for (position, row, dims, quantity) in accepted {
        for ordinal in 0..quantity {
            items.push(CargoItem {
                id: format!("item-{}-{}", position, ordinal),
                source_row_id: row.row_id.clone(),
                dimensions_mm: dims,
                volume_mm3: dims.volume(),
                color: row.color_hex.clone(),
            });
        }
    }
    Ok(items)
}

/// Sorts items by volume, largest first. Equal volumes keep their order.
pub fn sort_by_volume_desc(items: &mut [CargoItem]) {
    items.sort_by(|a, b| b.volume_mm3.total_cmp(&a.volume_mm3));
}

/// Picks the type for a container opened for `item`.
///
/// Dimension rules are evaluated first: anything that overflows the 40' HC on
/// some axis needs the flat rack, and anything longer or higher than the 20' DV
/// needs the high cube. Afterwards a 20' DV choice is upgraded to the high cube
/// when the item's volume alone exceeds the 20' DV. The volume rule never leads
/// to a flat rack and never replaces one.
pub fn select_container_kind(item: &CargoItem) -> ContainerKind {
    let dims = &item.dimensions_mm;
    let small = ContainerKind::TwentyDv.spec();
    let high_cube = ContainerKind::FortyHc.spec();

    let by_dimensions = if !dims.fits_within(&high_cube.max_dimensions_mm) {
        ContainerKind::FortyFr
    } else if dims.length > small.max_dimensions_mm.length
        || dims.height > small.max_dimensions_mm.height
    {
        ContainerKind::FortyHc
    } else {
        ContainerKind::TwentyDv
    };

    if by_dimensions == ContainerKind::TwentyDv && item.volume_mm3 > small.max_volume_mm3 {
        ContainerKind::FortyHc
    } else {
        by_dimensions
    }
}

/// Runs a complete planning pass.
pub fn plan(rows: &[RowInput], config: PlanningConfig) -> Result<PlanningResult, PlanningError> {
    plan_with_progress(rows, config, |_| {})
}

/// Runs a complete planning pass, reporting each step to `on_event`.
///
/// Returns `NoValidItems` without emitting any event when no row survives expansion.
pub fn plan_with_progress(
    rows: &[RowInput],
    config: PlanningConfig,
    mut on_event: impl FnMut(&PlanEvent),
) -> Result<PlanningResult, PlanningError> {
    let mut items = expand_rows(rows, &config)?;
    if items.is_empty() {
        return Err(PlanningError::NoValidItems);
    }
    sort_by_volume_desc(&mut items);

    let item_count = items.len();
    let containers = assign_items(items, &config, &mut on_event);

    on_event(&PlanEvent::Finished {
        containers: containers.len(),
        items: item_count,
    });
    Ok(aggregate(containers))
}

/// Greedy first-fit over containers in opening order.
///
/// `items` must already be in the desired placement order. An item no open
/// container accepts always opens a new one, even if it exceeds the chosen
/// type's volume cap or internal dimensions.
pub fn assign_items(
    items: Vec<CargoItem>,
    config: &PlanningConfig,
    on_event: &mut impl FnMut(&PlanEvent),
) -> Vec<Container> {
    let mut containers: Vec<Container> = Vec::new();

    for item in items {
        // Try the already opened containers first
        if let Some(target) = containers
            .iter_mut()
            .find(|c| c.accepts(&item, config.packing_efficiency))
        {
            let item_id = item.id.clone();
            target.push(item);
            on_event(&PlanEvent::ItemAssigned {
                sequence_id: target.sequence_id.clone(),
                item_id,
                used_volume_mm3: target.used_volume_mm3,
            });
            continue;
        }

        let kind = select_container_kind(&item);
        let ordinal = 1 + containers.iter().filter(|c| c.kind == kind).count();
        let opened = Container::open(kind, ordinal, item);
        if opened.is_dimension_overflow() {
            tracing::warn!(
                item_id = %opened.items[0].id,
                container = %opened.sequence_id,
                "item exceeds the internal dimensions of every container type"
            );
        }
        on_event(&PlanEvent::ContainerOpened {
            sequence_id: opened.sequence_id.clone(),
            kind,
            item_id: opened.items[0].id.clone(),
            used_volume_mm3: opened.used_volume_mm3,
        });
        containers.push(opened);
    }

    containers
}

/// Counts containers per type, collects per-row assignments and sorts the
/// containers for display.
pub fn aggregate(mut containers: Vec<Container>) -> PlanningResult {
    let mut counts_by_type = ContainerCounts::default();
    let mut by_row: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for container in &containers {
        counts_by_type.increment(container.kind);
        for item in &container.items {
            by_row
                .entry(item.source_row_id.clone())
                .or_default()
                .insert(container.sequence_id.clone());
        }
    }

    let row_assignments = by_row
        .into_iter()
        .map(|(row, ids)| {
            let mut ids: Vec<String> = ids.into_iter().collect();
            ids.sort_by(|a, b| natural_cmp(a, b));
            (row, ids)
        })
        .collect();

    containers.sort_by(|a, b| natural_cmp(&a.sequence_id, &b.sequence_id));

    PlanningResult {
        counts_by_type,
        containers,
        row_assignments,
    }
}

/// Numeric-aware string ordering: digit runs compare by value, other
/// characters case-insensitively. `20DV-2` sorts before `20DV-10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let l_num = l_run.trim_start_matches('0');
                let r_num = r_run.trim_start_matches('0');
                let ord = l_num
                    .len()
                    .cmp(&r_num.len())
                    .then_with(|| l_num.cmp(r_num));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.to_lowercase().cmp(r.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        run.push(c);
    }
    run
}
