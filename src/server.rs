//! HTTP server for redirects and health checks.
//!
//! `/health` reports catalog and storage state. `/` and `/sr` redirect the
//! visitor to the study pinned to their query parameters.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::error::RedirectError;
use crate::redirect::{AppState, HealthStatus, StudyRoulette};
use crate::store::ParameterSet;

type HttpResponse = Response<Full<Bytes>>;

/// Result of resolving one redirect request.
enum RedirectOutcome {
    Found(String),
    BadRequest(RedirectError),
    Unhealthy(StudyRoulette),
}

/// Routes one request.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<HttpResponse, Infallible> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    let response = match path.as_str() {
        "/health" => health(state).await,
        "/" | "/sr" => redirect(state, query).await,
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

async fn health(state: Arc<AppState>) -> HttpResponse {
    match tokio::task::spawn_blocking(move || state.roulette()).await {
        Ok(roulette) => health_response(&roulette),
        Err(e) => {
            tracing::error!(error = %e, "health check task failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn redirect(state: Arc<AppState>, query: String) -> HttpResponse {
    tracing::debug!(query = %query, "received redirect request");

    let outcome = tokio::task::spawn_blocking(move || resolve_redirect(&state, &query)).await;

    match outcome {
        Ok(RedirectOutcome::Found(destination)) => {
            tracing::debug!(destination = %destination, "redirecting");
            redirect_response(&destination)
        }
        Ok(RedirectOutcome::BadRequest(e)) => json_response(
            StatusCode::NOT_FOUND,
            &ErrorBody {
                errors: vec![e.to_string()],
            },
        ),
        Ok(RedirectOutcome::Unhealthy(roulette)) => health_response(&roulette),
        Err(e) => {
            let e = RedirectError::Task(e.to_string());
            tracing::error!(error = %e, "redirect task failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Blocking part of a redirect: catalog read, lock, and record I/O.
fn resolve_redirect(state: &AppState, query: &str) -> RedirectOutcome {
    let roulette = state.roulette();
    if !roulette.has_eligible_studies() {
        return RedirectOutcome::Unhealthy(roulette);
    }

    let params = ParameterSet::from_query(query);
    tracing::debug!(?params, "parsed parameters");

    match roulette.get_or_create_redirect(&params) {
        Ok(destination) => RedirectOutcome::Found(destination),
        Err(e) if e.is_client_error() => RedirectOutcome::BadRequest(e),
        Err(e) => {
            tracing::debug!(error = %e, "redirect failed");
            RedirectOutcome::Unhealthy(roulette.with_error(e.to_string()))
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    errors: Vec<String>,
}

fn health_response(roulette: &StudyRoulette) -> HttpResponse {
    let status = match roulette.status() {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_response(status, &roulette.report())
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = text_response(status, bytes);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response body");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn redirect_response(destination: &str) -> HttpResponse {
    match HeaderValue::from_str(destination) {
        Ok(location) => {
            let mut response = text_response(StatusCode::FOUND, Bytes::new());
            response.headers_mut().insert(LOCATION, location);
            response
        }
        Err(e) => {
            tracing::error!(destination = %destination, error = %e, "destination is not a valid header");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Binds `addr` and serves requests until the listener fails.
pub async fn start_server(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "http server listening");
    serve(listener, state).await
}

/// Accepts connections on `listener`, one task per connection.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "http connection error");
            }
        });
    }
}
