//! HTTP surface for Rusty Reader.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /documents` – List ids of cached documents.
//! - `GET /documents/:document_id` – Return the document text and start its analysis in the
//!   background (never forced). The response carries the job status observed at request time.
//! - `GET /documents/:document_id/analysis` – Return the current analysis job record.
//! - `POST /documents/:document_id/analysis` – Start analysis explicitly; `{"force": true}`
//!   re-runs a completed or failed job. An empty body means no force.
//! - `GET /analyses` – List every recorded analysis job.
//! - `GET /metrics` – Observe analysis counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Analysis never blocks a request: results become visible by polling the job record.

use crate::analysis::{AnalysisApi, ServiceError, StartOutcome};
use crate::documents::DocumentError;
use crate::jobs::{AnalysisJob, JobStatus};
use crate::metrics::MetricsSnapshot;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Build the HTTP router exposing the analysis API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: AnalysisApi + 'static,
{
    Router::new()
        .route("/documents", get(list_documents::<S>))
        .route("/documents/:document_id", get(open_document::<S>))
        .route(
            "/documents/:document_id/analysis",
            get(get_analysis::<S>).post(start_analysis::<S>),
        )
        .route("/analyses", get(list_analyses::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<String>,
}

/// List cached document ids.
async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: AnalysisApi,
{
    let documents = service.list_documents().await?;
    Ok(Json(DocumentsResponse { documents }))
}

/// Response body for `GET /documents/:document_id`.
#[derive(Serialize)]
struct DocumentResponse {
    document_id: String,
    source_path: PathBuf,
    content: String,
    /// Job status right after the start request; absent when the job store was unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_outcome: Option<&'static str>,
}

/// Return a document and kick off its analysis without waiting for it.
async fn open_document<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentResponse>, AppError>
where
    S: AnalysisApi,
{
    let opened = service.open_document(&document_id).await?;
    let document = opened.document;
    Ok(Json(DocumentResponse {
        document_id: document.id,
        source_path: document.source_path,
        content: document.text,
        analysis_status: opened.analysis.as_ref().map(|outcome| outcome.job().status),
        analysis_outcome: opened.analysis.as_ref().map(StartOutcome::label),
    }))
}

/// Return the analysis job record for a document.
async fn get_analysis<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<String>,
) -> Result<Json<AnalysisJob>, AppError>
where
    S: AnalysisApi,
{
    match service.analysis(&document_id).await? {
        Some(job) => Ok(Json(job)),
        None => Err(AppError::not_found(format!(
            "No analysis recorded for document '{document_id}'"
        ))),
    }
}

/// Request body for `POST /documents/:document_id/analysis`.
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StartRequest {
    /// Re-run a completed or failed analysis.
    #[serde(default)]
    force: bool,
}

impl StartRequest {
    /// Parse the request body; a blank body is the default request.
    fn parse(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|error| AppError::bad_request(format!("Invalid request body: {error}")))
    }
}

/// Response body for `POST /documents/:document_id/analysis`.
#[derive(Serialize)]
struct StartResponse {
    outcome: &'static str,
    job: AnalysisJob,
}

/// Start (or restart) analysis. Answers `202 Accepted` when a run was spawned.
async fn start_analysis<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartResponse>), AppError>
where
    S: AnalysisApi,
{
    let StartRequest { force } = StartRequest::parse(&body)?;
    let outcome = service.start_analysis(&document_id, force).await?;
    let status = if outcome.started() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(StartResponse {
            outcome: outcome.label(),
            job: outcome.into_job(),
        }),
    ))
}

/// Response body for `GET /analyses`.
#[derive(Serialize)]
struct AnalysesResponse {
    analyses: Vec<AnalysisJob>,
}

/// List every recorded analysis job.
async fn list_analyses<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<AnalysesResponse>, AppError>
where
    S: AnalysisApi,
{
    let analyses = service.list_analyses().await?;
    Ok(Json(AnalysesResponse { analyses }))
}

/// Return analysis counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: AnalysisApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "list_documents",
                method: "GET",
                path: "/documents",
                description: "Return the ids of cached documents available for analysis.",
                request_example: None,
            },
            CommandDescriptor {
                name: "open_document",
                method: "GET",
                path: "/documents/:document_id",
                description: "Return the document text and start its analysis in the background. Poll the analysis endpoint for the result.",
                request_example: None,
            },
            CommandDescriptor {
                name: "get_analysis",
                method: "GET",
                path: "/documents/:document_id/analysis",
                description: "Return the analysis job: status (in_progress | completed | failed), summary, sentiment, language, key_characters, themes.",
                request_example: None,
            },
            CommandDescriptor {
                name: "start_analysis",
                method: "POST",
                path: "/documents/:document_id/analysis",
                description: "Start analysis explicitly. Completed or failed jobs are re-run only with force.",
                request_example: Some(json!({ "force": true })),
            },
            CommandDescriptor {
                name: "list_analyses",
                method: "GET",
                path: "/analyses",
                description: "Return every recorded analysis job ordered by document id.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return analysis run counters.",
                request_example: None,
            },
        ],
    })
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        let status = match &inner {
            ServiceError::Document(DocumentError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Document(DocumentError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => {
                tracing::error!(error = %inner, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: inner.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::analysis::{AnalysisApi, OpenedDocument, ServiceError, StartOutcome};
    use crate::documents::{Document, DocumentError};
    use crate::jobs::{AnalysisJob, JobStatus};
    use crate::metrics::MetricsSnapshot;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_analysis_endpoints() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let start = commands
            .iter()
            .find(|cmd| cmd.name == "start_analysis")
            .expect("start command present");

        assert_eq!(start.method, "POST");
        assert_eq!(start.path, "/documents/:document_id/analysis");
        assert!(commands.iter().any(|cmd| cmd.name == "get_analysis"));
    }

    #[tokio::test]
    async fn opening_a_document_reports_the_started_job() {
        let service = Arc::new(StubService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(request(Method::GET, "/documents/moby", None))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["document_id"], "moby");
        assert_eq!(body["content"], "Call me Ishmael.");
        assert_eq!(body["analysis_status"], "in_progress");
        assert_eq!(body["analysis_outcome"], "started");
        assert_eq!(*service.starts.lock().await, vec![("moby".to_string(), false)]);
    }

    #[tokio::test]
    async fn unknown_and_invalid_documents_map_to_client_errors() {
        let app = create_router(Arc::new(StubService::default()));

        let missing = app
            .clone()
            .oneshot(request(Method::GET, "/documents/absent", None))
            .await
            .expect("router response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert!(json_body(missing).await["error"].is_string());

        let invalid = app
            .oneshot(request(Method::GET, "/documents/bad%20id", None))
            .await
            .expect("router response");
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analysis_route_returns_job_or_404() {
        let app = create_router(Arc::new(StubService::default()));

        let found = app
            .clone()
            .oneshot(request(Method::GET, "/documents/moby/analysis", None))
            .await
            .expect("router response");
        assert_eq!(found.status(), StatusCode::OK);
        let body = json_body(found).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["themes"], json!(["obsession"]));

        let missing = app
            .oneshot(request(Method::GET, "/documents/absent/analysis", None))
            .await
            .expect("router response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forced_start_is_accepted() {
        let service = Arc::new(StubService::default());
        let app = create_router(service.clone());

        let forced = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/documents/moby/analysis",
                Some(json!({ "force": true })),
            ))
            .await
            .expect("router response");
        assert_eq!(forced.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(forced).await["outcome"], "started");

        let plain = app
            .oneshot(request(Method::POST, "/documents/moby/analysis", None))
            .await
            .expect("router response");
        assert_eq!(plain.status(), StatusCode::OK);
        assert_eq!(json_body(plain).await["outcome"], "already_finished");

        assert_eq!(
            *service.starts.lock().await,
            vec![("moby".to_string(), true), ("moby".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn malformed_start_body_is_rejected() {
        let service = Arc::new(StubService::default());
        let app = create_router(service.clone());

        let malformed = app
            .clone()
            .oneshot(raw_request(
                Method::POST,
                "/documents/moby/analysis",
                r#"{"force": tru}"#,
            ))
            .await
            .expect("router response");
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(malformed).await["error"].is_string());

        let misspelled = app
            .clone()
            .oneshot(raw_request(
                Method::POST,
                "/documents/moby/analysis",
                r#"{"forse": true}"#,
            ))
            .await
            .expect("router response");
        assert_eq!(misspelled.status(), StatusCode::BAD_REQUEST);

        let blank = app
            .oneshot(raw_request(Method::POST, "/documents/moby/analysis", "  \n"))
            .await
            .expect("router response");
        assert_eq!(blank.status(), StatusCode::OK);

        assert_eq!(
            *service.starts.lock().await,
            vec![("moby".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn analyses_route_lists_jobs() {
        let app = create_router(Arc::new(StubService::default()));
        let response = app
            .oneshot(request(Method::GET, "/analyses", None))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["analyses"][0]["document_id"], "moby");
        assert_eq!(body["analyses"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let app = create_router(Arc::new(StubService::default()));
        let response = app
            .oneshot(request(Method::GET, "/metrics", None))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["runs_completed"], 3);
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request")
    }

    fn raw_request(method: Method, uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn job(status: JobStatus) -> AnalysisJob {
        let completed = status == JobStatus::Completed;
        AnalysisJob {
            document_id: "moby".into(),
            status,
            summary: if completed { "A hunt.".into() } else { String::new() },
            sentiment: String::new(),
            language: String::new(),
            key_characters: Vec::new(),
            themes: if completed {
                vec!["obsession".into()]
            } else {
                Vec::new()
            },
            content_digest: "digest".into(),
            error: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            last_updated: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[derive(Default)]
    struct StubService {
        starts: Mutex<Vec<(String, bool)>>,
    }

    impl StubService {
        fn check(document_id: &str) -> Result<(), ServiceError> {
            match document_id {
                "moby" => Ok(()),
                "absent" => Err(DocumentError::NotFound(document_id.into()).into()),
                _ => Err(DocumentError::InvalidId(document_id.into()).into()),
            }
        }
    }

    #[async_trait]
    impl AnalysisApi for StubService {
        async fn list_documents(&self) -> Result<Vec<String>, ServiceError> {
            Ok(vec!["moby".into()])
        }

        async fn open_document(&self, document_id: &str) -> Result<OpenedDocument, ServiceError> {
            Self::check(document_id)?;
            self.starts.lock().await.push((document_id.into(), false));
            Ok(OpenedDocument {
                document: Document {
                    id: document_id.into(),
                    text: "Call me Ishmael.".into(),
                    source_path: PathBuf::from("uploads/moby.txt"),
                },
                analysis: Some(StartOutcome::Started(job(JobStatus::InProgress))),
            })
        }

        async fn start_analysis(
            &self,
            document_id: &str,
            force: bool,
        ) -> Result<StartOutcome, ServiceError> {
            Self::check(document_id)?;
            self.starts.lock().await.push((document_id.into(), force));
            Ok(if force {
                StartOutcome::Started(job(JobStatus::InProgress))
            } else {
                StartOutcome::AlreadyFinished(job(JobStatus::Completed))
            })
        }

        async fn analysis(&self, document_id: &str) -> Result<Option<AnalysisJob>, ServiceError> {
            Ok((document_id == "moby").then(|| job(JobStatus::Completed)))
        }

        async fn list_analyses(&self) -> Result<Vec<AnalysisJob>, ServiceError> {
            Ok(vec![job(JobStatus::Completed)])
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                runs_completed: 3,
                ..MetricsSnapshot::default()
            }
        }
    }
}
