use axum::extract::State;
use axum::response::IntoResponse;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/datasets
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_datasets(
    State(state): State<AppState>,
) -> impl IntoResponse {
    axum::Json(state.service.datasets()).into_response()
}
