//! Saved projects: editor rows, bulk text and the last planning result.
//!
//! A stored planning result is a snapshot. Loading a project hands it back
//! verbatim so the previous 3D view can be restored without re-planning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::watch;
use utoipa::ToSchema;

use crate::parse::{MAX_ROWS, default_color};
use crate::planner::{PlanningResult, RowInput};
use crate::store::{Collection, Document, Listing, StoreError};
use crate::types::LengthUnit;

pub const COLLECTION_NAME: &str = "projects";

/// One editor row as saved, fields kept as text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SavedRow {
    pub text: String,
    pub l: String,
    pub w: String,
    pub h: String,
    pub qty: String,
    pub unit: LengthUnit,
    pub color: String,
    pub assigned: String,
}

impl SavedRow {
    /// Planner input for this row, so a loaded project can be planned again.
    pub fn to_row_input(&self, index: usize) -> RowInput {
        RowInput {
            row_id: index.to_string(),
            length_raw: self.l.clone(),
            width_raw: self.w.clone(),
            height_raw: self.h.clone(),
            quantity_raw: self.qty.clone(),
            unit: self.unit,
            color_hex: if self.color.is_empty() {
                default_color(index).to_string()
            } else {
                self.color.clone()
            },
        }
    }

    fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    pub name: String,
    pub items: Vec<SavedRow>,
    #[serde(default)]
    pub bulk_text: String,
    #[serde(default)]
    pub bulk_unit: LengthUnit,
    #[serde(default)]
    pub calculated_results: Option<PlanningResult>,
    pub timestamp: DateTime<Utc>,
}

impl Document for ProjectDocument {
    fn key(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Request body for saving a project.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "name": "Shipment 42",
    "items": [{"text": "1000x500x500 2", "l": "1000", "w": "500", "h": "500", "qty": "2", "unit": "mm", "color": "#FFadad"}],
    "bulkText": "",
    "bulkUnit": "mm"
}))]
pub struct SaveProjectRequest {
    pub name: String,
    #[serde(default)]
    pub items: Vec<SavedRow>,
    #[serde(default)]
    pub bulk_text: String,
    #[serde(default)]
    pub bulk_unit: LengthUnit,
    #[serde(default)]
    pub calculated_results: Option<PlanningResult>,
}

/// Entry of the saved-projects list.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub row_count: usize,
    pub container_count: usize,
}

impl From<&ProjectDocument> for ProjectSummary {
    fn from(doc: &ProjectDocument) -> Self {
        Self {
            name: doc.name.clone(),
            timestamp: doc.timestamp,
            row_count: doc.items.iter().filter(|r| r.has_text()).count(),
            container_count: doc
                .calculated_results
                .as_ref()
                .map_or(0, PlanningResult::container_count),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Enter a project name")]
    MissingName,
    #[error("Add items or bulk text first")]
    NothingToSave,
    #[error("Project '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ProjectService {
    projects: Collection<ProjectDocument>,
}

impl ProjectService {
    pub fn new(projects: Collection<ProjectDocument>) -> Self {
        Self { projects }
    }

    pub async fn save(&self, request: SaveProjectRequest) -> Result<ProjectDocument, ProjectError> {
        self.save_at(request, Utc::now()).await
    }

    /// Saves a project, replacing any project with the same name.
    ///
    /// Rows beyond `MAX_ROWS` are dropped. Rows without an assignment label get
    /// one from the attached planning result.
    pub async fn save_at(
        &self,
        request: SaveProjectRequest,
        now: DateTime<Utc>,
    ) -> Result<ProjectDocument, ProjectError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ProjectError::MissingName);
        }
        if !request.items.iter().any(SavedRow::has_text) && request.bulk_text.trim().is_empty() {
            return Err(ProjectError::NothingToSave);
        }

        let mut items = request.items;
        items.truncate(MAX_ROWS);
        if let Some(result) = &request.calculated_results {
            for (idx, row) in items.iter_mut().enumerate() {
                if row.assigned.is_empty() {
                    row.assigned = result.row_label(&idx.to_string()).unwrap_or_default();
                }
            }
        }

        let doc = ProjectDocument {
            name: name.to_string(),
            items,
            bulk_text: request.bulk_text,
            bulk_unit: request.bulk_unit,
            calculated_results: request.calculated_results,
            timestamp: now,
        };
        self.projects.put(doc.clone()).await?;
        tracing::info!(project = %doc.name, rows = doc.items.len(), "project saved");
        Ok(doc)
    }

    /// Saved projects, newest first.
    pub async fn list(&self) -> Vec<ProjectSummary> {
        self.projects
            .list()
            .await
            .iter()
            .map(ProjectSummary::from)
            .collect()
    }

    pub async fn load(&self, name: &str) -> Result<ProjectDocument, ProjectError> {
        self.projects
            .get(name)
            .await
            .ok_or_else(|| ProjectError::NotFound(name.to_string()))
    }

    pub async fn delete(&self, name: &str) -> Result<(), ProjectError> {
        match self.projects.remove(name).await? {
            Some(_) => {
                tracing::info!(project = name, "project deleted");
                Ok(())
            }
            None => Err(ProjectError::NotFound(name.to_string())),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Listing<ProjectDocument>> {
        self.projects.subscribe()
    }
}
