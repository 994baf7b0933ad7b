use super::{AppState, links};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

/// Lists the API versions this server speaks.
pub async fn index(State(app): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "versions": [{
            "id": "v2",
            "status": "EXPERIMENTAL",
            "links": [links::version_link(&app.base_url, "v2")],
        }]
    });

    (StatusCode::MULTIPLE_CHOICES, Json(body))
}
