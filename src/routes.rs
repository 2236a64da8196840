use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bail_service;
use crate::error::{ServiceError, ServiceResult};
use crate::inference::executor::InferenceExecutor;
use crate::inference::task::answer::{AnswerRequest, AnswerResponse, QuestionAnswerer};
use crate::inference::task::summarize::{SummarizeRequest, SummarizeResponse, Summarizer};

const STATUS_SUCCESS: &str = "success";

#[derive(Clone)]
pub struct AnswerState {
    pub model: Arc<dyn QuestionAnswerer>,
    pub executor: InferenceExecutor,
}

#[derive(Clone)]
pub struct SummarizeState {
    pub model: Arc<dyn Summarizer>,
    pub executor: InferenceExecutor,
    /// Largest accepted `max_length`, `None` accepts any length
    pub max_summary_length: Option<usize>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

pub fn answer_router(state: AnswerState) -> Router {
    Router::new()
        .route("/answer", post(handle_answer_request))
        .route("/health", get(handle_health_request))
        .with_state(state)
}

pub fn summarize_router(state: SummarizeState) -> Router {
    Router::new()
        .route("/summarize", post(handle_summarize_request))
        .route("/health", get(handle_health_request))
        .with_state(state)
}

#[axum_macros::debug_handler]
async fn handle_answer_request(
    State(state): State<AnswerState>,
    WithRejection(Json(req), _): WithRejection<Json<AnswerRequest>, ServiceError>,
) -> ServiceResult<(StatusCode, Json<AnswerResponse>)> {
    info!(
        question_len = req.question.len(),
        context_len = req.context.len(),
        "Received question"
    );
    if !req.is_valid() {
        bail_service!(StatusCode::BAD_REQUEST, "Question and context are required");
    }

    let model = state.model.clone();
    let (question, context) = (req.question.clone(), req.context.clone());
    let answer = state
        .executor
        .run(move || model.answer(&question, &context))
        .await?;
    info!(
        answer_start = answer.start,
        answer_end = answer.end,
        confidence = answer.score,
        "Answer found"
    );

    Ok((
        StatusCode::OK,
        Json(AnswerResponse {
            status: STATUS_SUCCESS.into(),
            question: req.question,
            answer: answer.text,
            confidence: answer.score,
        }),
    ))
}

#[axum_macros::debug_handler]
async fn handle_summarize_request(
    State(state): State<SummarizeState>,
    WithRejection(Json(req), _): WithRejection<Json<SummarizeRequest>, ServiceError>,
) -> ServiceResult<(StatusCode, Json<SummarizeResponse>)> {
    info!(
        text_len = req.text.len(),
        max_length = req.max_length,
        min_length = req.min_length,
        "Received text for summarization"
    );
    let length = match req.validate(state.max_summary_length) {
        Ok(length) => length,
        Err(message) => bail_service!(StatusCode::BAD_REQUEST, message),
    };

    let model = state.model.clone();
    let text = req.text.clone();
    let summary = state
        .executor
        .run(move || model.summarize(&text, length))
        .await?;

    Ok((
        StatusCode::OK,
        Json(SummarizeResponse {
            status: STATUS_SUCCESS.into(),
            original_text: req.text,
            summary,
        }),
    ))
}

async fn handle_health_request() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
    })
}
