//! Query parameter extractors for list endpoints.

use serde::Deserialize;

/// Query parameters for the envelope list endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct EnvelopeListQuery {
    /// Filter by status (draft, sent, completed, ...).
    pub status: Option<String>,
    /// Sort order by creation time (asc, desc).
    #[serde(default = "default_order")]
    pub order: String,
    /// Maximum results.
    pub limit: Option<i64>,
    /// Offset for pagination.
    pub offset: Option<i64>,
}

fn default_order() -> String {
    "desc".to_string()
}
