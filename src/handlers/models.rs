use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::handlers::chat_completions::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelObject>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

/// Handle /v1/models endpoint
/// Returns list of all available models
/// TODO: Implement dynamic model discovery from providers
pub async fn list_models(State(_state): State<AppState>) -> impl IntoResponse {
    // Temporary implementation: return empty list
    // Full model discovery will be implemented in phase 2
    let models: Vec<ModelObject> = vec![];

    Json(ModelsResponse {
        object: "list".to_string(),
        data: models,
    })
}
