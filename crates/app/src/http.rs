//! HTTP control surface.
//!
//! Every route turns into one [`Operation`] sent through the [`TreeHandle`];
//! the scheduler applies it between frames and the reply goes back as JSON.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mr_tree_core::api::{self, ErrorBody};
use mr_tree_core::{HttpConfig, Operation, Reply, StateUpdate, TreeError, TreeHandle};

/// Error wrapper that maps controller errors onto status codes.
struct ApiError(TreeError);

impl From<TreeError> for ApiError {
    fn from(err: TreeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            TreeError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(err = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

async fn dispatch(tree: &TreeHandle, op: Operation) -> ApiResult {
    Ok(match tree.call(op).await? {
        Reply::Tree(state) => Json(state).into_response(),
        Reply::Timer(timer) => Json(timer).into_response(),
    })
}

async fn on(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::On).await
}

async fn off(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::Off).await
}

async fn color(State(tree): State<TreeHandle>, Path(hex): Path<String>) -> ApiResult {
    dispatch(&tree, api::color(&hex)?).await
}

async fn brightness(State(tree): State<TreeHandle>, Path(value): Path<String>) -> ApiResult {
    dispatch(&tree, api::brightness(&value)?).await
}

async fn effect(
    State(tree): State<TreeHandle>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    dispatch(&tree, api::effect(&name, &body)?).await
}

async fn next(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::NextAnimation(1)).await
}

async fn pause(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::Pause).await
}

async fn resume(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::Resume).await
}

async fn speed(State(tree): State<TreeHandle>, Path(value): Path<String>) -> ApiResult {
    dispatch(&tree, api::speed(&value)?).await
}

async fn get_state(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::GetState).await
}

async fn set_state(State(tree): State<TreeHandle>, body: Bytes) -> ApiResult {
    let update = StateUpdate::from_json(&body)?;
    update.validate()?;
    dispatch(&tree, Operation::ApplyState(update)).await
}

async fn timer_start(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::TimerStart).await
}

async fn timer_pause(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::TimerPause).await
}

async fn timer_resume(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::TimerResume).await
}

async fn timer_cancel(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::TimerCancel).await
}

async fn timer_duration(State(tree): State<TreeHandle>, Path(secs): Path<String>) -> ApiResult {
    dispatch(&tree, api::timer_duration(&secs)?).await
}

async fn timer_state(State(tree): State<TreeHandle>) -> ApiResult {
    dispatch(&tree, Operation::TimerState).await
}

pub fn router(tree: TreeHandle) -> Router {
    Router::new()
        .route("/on", get(on).post(on))
        .route("/off", get(off).post(off))
        .route("/color/:hex", get(color).post(color))
        .route("/brightness/:value", get(brightness).post(brightness))
        .route("/effect/:name", get(effect).post(effect))
        .route("/next", get(next).post(next))
        .route("/pause", get(pause).post(pause))
        .route("/resume", get(resume).post(resume))
        .route("/speed/:value", get(speed).post(speed))
        .route("/state", get(get_state).post(set_state))
        .route("/timer/start", post(timer_start))
        .route("/timer/pause", post(timer_pause))
        .route("/timer/resume", post(timer_resume))
        .route("/timer/cancel", post(timer_cancel))
        .route("/timer/duration/:secs", post(timer_duration))
        .route("/timer/state", get(timer_state))
        .with_state(tree)
}

/// Serves the control routes until the listener fails.
pub async fn serve(config: &HttpConfig, tree: TreeHandle) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "http surface listening");
    axum::serve(listener, router(tree)).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use mr_tree_core::{Controller, CoordinateSpace, RenderConfig, Scheduler, TracingSink, TreeConfig};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn spawn_tree() -> TreeHandle {
        let coords = (0..20).map(|i| [i, i % 4, 20 - i]).collect();
        let coords = Arc::new(CoordinateSpace::new(coords).unwrap());
        let controller = Controller::new(coords, &TreeConfig::default());
        let (scheduler, handle) =
            Scheduler::new(controller, TracingSink::new(), &RenderConfig::default());
        tokio::spawn(scheduler.run());
        handle
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn mutations_return_snapshot() {
        let app = router(spawn_tree());

        let (status, state) = send(&app, Method::GET, "/color/ff0000", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["color"]["r"], 255);
        assert_eq!(state["color"]["g"], 0);

        let (_, state) = send(&app, Method::POST, "/brightness/128", "").await;
        assert_eq!(state["brightness"], 128);

        let (_, state) = send(&app, Method::POST, "/effect/sweep", r#"{"lead":4}"#).await;
        assert_eq!(state["effect"], "sweep");
        assert_eq!(state["effect_params"]["lead"], 4);

        let (_, state) = send(&app, Method::POST, "/off", "").await;
        assert_eq!(state["state"], "OFF");
        assert_eq!(state["brightness"], 0);
    }

    #[tokio::test]
    async fn client_errors_are_bad_requests() {
        let app = router(spawn_tree());

        for uri in ["/color/zzzzzz", "/brightness/256", "/speed/101", "/effect/disco"] {
            let (status, body) = send(&app, Method::POST, uri, "").await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string());
        }

        let (status, _) = send(&app, Method::POST, "/state", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/timer/pause", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_state_and_timer_routes() {
        let app = router(spawn_tree());

        let (status, state) = send(
            &app,
            Method::POST,
            "/state",
            r#"{"state":"ON","effect":"timer","effect_params":{"duration":30}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["effect"], "timer");

        let (_, timer) = send(&app, Method::GET, "/timer/state", "").await;
        assert_eq!(timer["state"], "idle");
        assert_eq!(timer["duration"], 30);

        let (_, timer) = send(&app, Method::POST, "/timer/duration/45", "").await;
        assert_eq!(timer["duration"], 45);

        let (_, timer) = send(&app, Method::POST, "/timer/start", "").await;
        assert_eq!(timer["state"], "active");

        let (_, timer) = send(&app, Method::POST, "/timer/pause", "").await;
        assert_eq!(timer["state"], "paused");

        let (_, timer) = send(&app, Method::POST, "/timer/cancel", "").await;
        assert_eq!(timer["state"], "idle");
    }
}
