//! REST API types for frontend integration.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{PipelineError, ServerError};
use crate::models::{CategoryColumnMap, Diagnostics, Table, TableKind};
use crate::parser::SourceFormat;
use crate::query;
use crate::transform::pipeline::Snapshot;

/// Response to session creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

/// Row counts of the snapshot tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCounts {
    pub products: usize,
    pub references: usize,
    pub applications: usize,
}

/// Format detected for one uploaded table
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFormat {
    pub table: TableKind,
    pub format: SourceFormat,
}

/// Sent after an upload and by the summary endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub session_id: String,

    /// Status: "ready" or "degraded"
    pub status: String,

    /// Whether the snapshot was reused for unchanged inputs
    pub cached: bool,

    pub fingerprint: Option<String>,
    pub computed_at: String,
    pub rows: TableCounts,
    pub pivot_width: usize,
    pub categories: Vec<String>,
    pub product_key_column: String,
    pub formats: Vec<InputFormat>,
    pub diagnostics: Diagnostics,
    /// Human-readable degradation warnings
    pub warnings: Vec<String>,
}

impl SnapshotSummary {
    pub fn new(session_id: &str, snapshot: &Snapshot, cached: bool) -> Self {
        let degraded = snapshot.diagnostics.is_degraded();
        Self {
            session_id: session_id.to_string(),
            status: if degraded { "degraded" } else { "ready" }.to_string(),
            cached,
            fingerprint: snapshot.fingerprint.as_ref().map(|f| f.as_str().to_string()),
            computed_at: snapshot.computed_at.to_rfc3339(),
            rows: TableCounts {
                products: snapshot.merged.len(),
                references: snapshot.references.len(),
                applications: snapshot.applications.len(),
            },
            pivot_width: snapshot.pivot_width,
            categories: query::categories(snapshot),
            product_key_column: snapshot.product_key_column.clone(),
            formats: snapshot
                .formats
                .iter()
                .map(|(table, format)| InputFormat {
                    table: *table,
                    format: format.clone(),
                })
                .collect(),
            diagnostics: snapshot.diagnostics.clone(),
            warnings: snapshot
                .diagnostics
                .degradations
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// Category map response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoriesResponse {
    pub category_column: String,
    pub categories: CategoryColumnMap,
}

/// A table view as sent to the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePayload {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_count: usize,
}

impl From<Table> for TablePayload {
    fn from(table: Table) -> Self {
        Self {
            row_count: table.len(),
            columns: table.headers,
            rows: table.rows,
        }
    }
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Pipeline(PipelineError::MissingInput(_)) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(PipelineError::Load { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::NoSnapshot(_) => StatusCode::CONFLICT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let mut body = error_response(&self.to_string());
        if let ServerError::Pipeline(PipelineError::MissingInput(kinds)) = &self {
            body["missing"] = json!(kinds);
        }
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;

    #[test]
    fn test_table_payload_counts_rows() {
        let table = Table::with_rows(["a", "b"], vec![vec!["1".into(), "2".into()]]);
        let payload = TablePayload::from(table);

        assert_eq!(payload.row_count, 1);
        assert_eq!(payload.columns, vec!["a", "b"]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["rowCount"], 1);
    }

    #[test]
    fn test_error_status_codes() {
        let missing = ServerError::Pipeline(PipelineError::MissingInput(vec![TableKind::Products]));
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let load = ServerError::Pipeline(PipelineError::Load {
            table: TableKind::Products,
            source: LoadError::EmptyFile,
        });
        assert_eq!(load.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(ServerError::SessionNotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ServerError::NoSnapshot("x".into()).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_response_shape() {
        let body = error_response("boom");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "boom");
    }
}
