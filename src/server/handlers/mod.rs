
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use super::{ApiError, AppState};
use crate::documents::Document;
use crate::ingest::IngestReport;
use crate::rag::{RagAnswer, RagQuery};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub documents: Vec<Document>,
    pub scores: Vec<f32>,
}

#[inline]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[inline]
pub async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<RagAnswer>, ApiError> {
    let Json(request) = payload?;
    debug!("POST /api/ask top_k={:?}", request.top_k);
    let query = RagQuery {
        question: request.question,
        top_k: request.top_k,
    };
    let answer = state.orchestrator.answer(&query).await?;
    Ok(Json(answer))
}

#[inline]
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>, ApiError> {
    let Json(request) = payload?;
    debug!("POST /api/retrieve top_k={:?}", request.top_k);
    let query = RagQuery {
        question: request.query,
        top_k: request.top_k,
    };
    let results = state.orchestrator.retrieve(&query).await?;

    let (documents, scores) = results
        .into_iter()
        .map(|result| (result.document, result.score))
        .unzip();
    Ok(Json(RetrieveResponse { documents, scores }))
}

#[inline]
pub async fn ingest(State(state): State<Arc<AppState>>) -> Result<Json<IngestReport>, ApiError> {
    debug!("POST /api/ingest");
    let ingestor = state
        .ingestor
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("No feed source configured".to_string()))?;
    let report = ingestor.run().await?;
    Ok(Json(report))
}
