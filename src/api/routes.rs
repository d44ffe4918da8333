use crate::ai::ReportFetcher;
use crate::api::get_embedded_asset;
use crate::config::Config;
use crate::export::{
    EXPORT_FAILURE_MESSAGE, ExportedImage, RasterOptions, Rasterizer, render_report_image,
};
use crate::report::render::{Block, CardOptions, card_html, render_blocks};
use crate::report::{Report, SourceLink};
use crate::topic::Topic;
use crate::workflow::{Step, Workflow};
use anyhow::anyhow;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, warn};

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub workflow: Arc<Mutex<Workflow>>,
    pub fetcher: ReportFetcher,
    pub rasterizer: Arc<dyn Rasterizer>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/topics", get(topics))
        .route("/api/v1/state", get(current_state))
        .route("/api/v1/topics/:slug/toggle", post(toggle_topic))
        .route("/api/v1/generate", post(generate))
        .route("/api/v1/reset", post(reset))
        .route("/api/v1/report/html", get(report_html))
        .route("/api/v1/report/export", get(report_export))
        .route("/api/v1/report/export/data-uri", get(report_export_data_uri))
        .fallback(get(static_assets))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct TopicView {
    slug: &'static str,
    label: &'static str,
    english_name: &'static str,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct TopicsPayload {
    topics: Vec<TopicView>,
}

#[derive(Debug, Serialize)]
struct ReportPayload {
    content: String,
    sources: Vec<SourceLink>,
    generated_at: DateTime<Utc>,
    blocks: Vec<Block>,
}

#[derive(Debug, Serialize)]
struct StatePayload {
    step: Step,
    selected: Vec<&'static str>,
    can_generate: bool,
    error: Option<String>,
    status_message: Option<&'static str>,
    report: Option<ReportPayload>,
}

#[derive(Debug, Serialize)]
struct DataUriPayload {
    file_name: String,
    data_uri: String,
}

async fn topics(State(state): State<ApiState>) -> ApiResult<Json<TopicsPayload>> {
    let workflow = lock(&state.workflow)?;
    let topics = Topic::ALL
        .into_iter()
        .map(|topic| TopicView {
            slug: topic.slug(),
            label: topic.label(),
            english_name: topic.english_name(),
            selected: workflow.selection().contains(topic),
        })
        .collect::<Vec<_>>();

    Ok(Json(TopicsPayload { topics }))
}

async fn current_state(State(state): State<ApiState>) -> ApiResult<Json<StatePayload>> {
    let workflow = lock(&state.workflow)?;
    Ok(Json(snapshot(&workflow)))
}

async fn toggle_topic(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<StatePayload>> {
    let topic = slug
        .parse::<Topic>()
        .map_err(|error| ApiError::BadRequest(error.to_string()))?;

    let mut workflow = lock(&state.workflow)?;
    if !workflow.toggle(topic) {
        return Err(ApiError::Conflict(
            "Topics can only be changed while selecting".to_string(),
        ));
    }

    Ok(Json(snapshot(&workflow)))
}

async fn generate(State(state): State<ApiState>) -> ApiResult<(StatusCode, Json<StatePayload>)> {
    let (pending, payload) = {
        let mut workflow = lock(&state.workflow)?;
        let pending = workflow.begin(Local::now().date_naive()).ok_or_else(|| {
            ApiError::Conflict("Select at least one topic while in the config step".to_string())
        })?;
        (pending, snapshot(&workflow))
    };

    let fetcher = state.fetcher.clone();
    let workflow = Arc::clone(&state.workflow);
    tokio::spawn(async move {
        let outcome = fetcher.fetch(&pending.request).await;
        match workflow.lock() {
            Ok(mut guard) => {
                guard.complete(pending.ticket, outcome);
            }
            Err(_) => error!("workflow lock poisoned; report response dropped"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(payload)))
}

async fn reset(State(state): State<ApiState>) -> ApiResult<Json<StatePayload>> {
    let mut workflow = lock(&state.workflow)?;
    workflow.reset();
    Ok(Json(snapshot(&workflow)))
}

async fn report_html(State(state): State<ApiState>) -> ApiResult<Response> {
    let report = current_report(&state)?;
    let html = card_html(
        &report,
        &CardOptions {
            background: state.config.export_background.clone(),
            cache_bust: None,
        },
    );

    let mut response = Response::new(html.into_response().into_body());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );

    Ok(response)
}

async fn report_export(State(state): State<ApiState>) -> ApiResult<Response> {
    let image = export_current(&state).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        image.ascii_file_name(),
        url::form_urlencoded::byte_serialize(image.file_name.as_bytes()).collect::<String>()
    );

    let mut response = Response::new(image.bytes.into_response().into_body());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)?,
    );

    Ok(response)
}

async fn report_export_data_uri(
    State(state): State<ApiState>,
) -> ApiResult<Json<DataUriPayload>> {
    let image = export_current(&state).await?;

    Ok(Json(DataUriPayload {
        data_uri: image.data_uri(),
        file_name: image.file_name,
    }))
}

async fn static_assets(uri: Uri) -> ApiResult<Response> {
    let path = uri.path();

    match get_embedded_asset(path) {
        Some((bytes, mime)) => {
            let mut response = Response::new(bytes.into_response().into_body());
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_str(&mime)?);
            Ok(response)
        }
        None => Err(ApiError::NotFound("Static asset not found".to_string())),
    }
}

async fn export_current(state: &ApiState) -> ApiResult<ExportedImage> {
    let report = current_report(state)?;
    let options = RasterOptions::from_config(&state.config);

    render_report_image(state.rasterizer.as_ref(), &report, &options)
        .await
        .map_err(|error| {
            warn!(error = %format!("{error:#}"), "report export failed");
            ApiError::Upstream(EXPORT_FAILURE_MESSAGE.to_string())
        })
}

fn current_report(state: &ApiState) -> ApiResult<Arc<Report>> {
    let workflow = lock(&state.workflow)?;
    workflow
        .report()
        .cloned()
        .ok_or_else(|| ApiError::NotFound("No report has been generated yet".to_string()))
}

fn snapshot(workflow: &Workflow) -> StatePayload {
    StatePayload {
        step: workflow.step(),
        selected: workflow
            .selection()
            .topics()
            .iter()
            .map(|topic| topic.slug())
            .collect(),
        can_generate: workflow.can_generate(),
        error: workflow.error().map(str::to_string),
        status_message: workflow.status_message(),
        report: workflow.report().map(|report| ReportPayload {
            content: report.content.clone(),
            sources: report.sources.clone(),
            generated_at: report.generated_at,
            blocks: render_blocks(&report.content),
        }),
    }
}

fn lock(workflow: &Mutex<Workflow>) -> ApiResult<MutexGuard<'_, Workflow>> {
    workflow
        .lock()
        .map_err(|_| ApiError::Internal(anyhow!("workflow state lock poisoned")))
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Upstream(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl From<axum::http::header::InvalidHeaderValue> for ApiError {
    fn from(value: axum::http::header::InvalidHeaderValue) -> Self {
        Self::Internal(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Upstream(message) => (StatusCode::BAD_GATEWAY, message),
            ApiError::Internal(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiState, router};
    use crate::ai::ReportFetcher;
    use crate::ai::tests::FakeBackend;
    use crate::config::Config;
    use crate::export::EXPORT_FAILURE_MESSAGE;
    use crate::export::tests::FakeRasterizer;
    use crate::workflow::Workflow;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(backend: FakeBackend, rasterizer: FakeRasterizer) -> Router {
        router(ApiState {
            config: Arc::new(Config::default()),
            workflow: Arc::new(Mutex::new(Workflow::new())),
            fetcher: ReportFetcher::new(Arc::new(backend)),
            rasterizer: Arc::new(rasterizer),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri).await;
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    async fn wait_for_step(app: &Router, step: &str) -> Value {
        for _ in 0..200 {
            let (_, state) = send_json(app, "GET", "/api/v1/state").await;
            if state["step"] == step {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("workflow never reached {step}");
    }

    #[tokio::test]
    async fn generate_without_topics_is_rejected_and_state_unchanged() {
        let app = app(FakeBackend::answering("## 体育", Vec::new()), FakeRasterizer::new(false));

        let (status, body) = send_json(&app, "POST", "/api/v1/generate").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let (_, state) = send_json(&app, "GET", "/api/v1/state").await;
        assert_eq!(state["step"], "CONFIG");
        assert_eq!(state["can_generate"], false);
    }

    #[tokio::test]
    async fn unknown_topic_is_a_bad_request() {
        let app = app(FakeBackend::answering("", Vec::new()), FakeRasterizer::new(false));

        let (status, _) = send_json(&app, "POST", "/api/v1/topics/weather/toggle").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_cycle_generate_export_reset() {
        let app = app(
            FakeBackend::answering("## 体育\n### #夺冠#\n- 网友：燃", Vec::new()),
            FakeRasterizer::new(false),
        );

        let (status, state) = send_json(&app, "POST", "/api/v1/topics/sports/toggle").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["selected"][0], "sports");

        let (status, state) = send_json(&app, "POST", "/api/v1/generate").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(state["step"], "PROCESSING");

        let state = wait_for_step(&app, "RESULT").await;
        assert_eq!(state["report"]["blocks"][0]["kind"], "section_heading");

        let (status, html) = send(&app, "GET", "/api/v1/report/html").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(html).expect("utf8").contains("<h3>#夺冠#</h3>"));

        let request = Request::builder()
            .uri("/api/v1/report/export")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .expect("content disposition")
            .to_string();
        assert!(disposition.contains("filename=\"zhaowen-"));
        assert!(disposition.contains("filename*=UTF-8''"));

        let (status, state) = send_json(&app, "POST", "/api/v1/reset").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["step"], "CONFIG");
        assert!(state["report"].is_null());
        assert_eq!(state["selected"][0], "sports");
    }

    #[tokio::test]
    async fn fetch_failure_lands_back_in_config_with_message() {
        let app = app(FakeBackend::failing(), FakeRasterizer::new(false));

        send_json(&app, "POST", "/api/v1/topics/finance/toggle").await;
        send_json(&app, "POST", "/api/v1/generate").await;

        let state = wait_for_step(&app, "CONFIG").await;
        assert!(state["error"].as_str().is_some_and(|message| !message.is_empty()));
        assert!(state["report"].is_null());
    }

    #[tokio::test]
    async fn export_failure_keeps_result_state() {
        let app = app(FakeBackend::answering("## 娱乐", Vec::new()), FakeRasterizer::new(true));

        send_json(&app, "POST", "/api/v1/topics/entertainment/toggle").await;
        send_json(&app, "POST", "/api/v1/generate").await;
        wait_for_step(&app, "RESULT").await;

        let (status, body) = send_json(&app, "GET", "/api/v1/report/export/data-uri").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], EXPORT_FAILURE_MESSAGE);

        let (_, state) = send_json(&app, "GET", "/api/v1/state").await;
        assert_eq!(state["step"], "RESULT");
    }

    #[tokio::test]
    async fn report_endpoints_need_a_report() {
        let app = app(FakeBackend::answering("", Vec::new()), FakeRasterizer::new(false));

        let (status, _) = send_json(&app, "GET", "/api/v1/report/export").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
