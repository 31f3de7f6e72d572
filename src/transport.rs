//! HTTP transport: maps `POST` and `GET ?wsdl` onto [`Dispatcher::handle`].

use crate::dispatcher::{Dispatcher, SoapRequest, SoapResponse, CONTENT_TYPE};
use crate::error::{soap_fault_response, CodecError, Fault};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tracing::{debug, error};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    path: String,
}

/// Build a router serving one SOAP endpoint at `path`.
///
/// axum's own body limit is disabled; the POST handler reads at most
/// `max_body_size + 1` bytes so an oversized request still gets a SOAP fault.
pub fn router(dispatcher: Arc<Dispatcher>, path: &str) -> Router {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let state = AppState {
        dispatcher,
        path: path.clone(),
    };

    Router::new()
        .route(&path, get(wsdl_handler).post(soap_handler))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// `GET <path>?wsdl` returns the WSDL document; any other GET is refused.
async fn wsdl_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    if !is_wsdl_query(query.as_deref()) {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "POST")],
            "POST a SOAP envelope, or GET ?wsdl for the service description",
        )
            .into_response();
    }

    let endpoint = endpoint_url(&headers, &state.path);
    into_http(state.dispatcher.handle(&SoapRequest::wsdl(&endpoint)))
}

/// `POST <path>` dispatches the body on the blocking pool.
async fn soap_handler(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    let endpoint = endpoint_url(&headers, &state.path);
    let max = state.dispatcher.inner().settings().max_body_size;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(size) = declared.filter(|&size| size > max) {
        return into_http(state.dispatcher.reject(CodecError::RequestTooLarge { size, max }));
    }
    let body = match axum::body::to_bytes(body, max.saturating_add(1)).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(error = %err, max, "Request body not read");
            let size = declared.unwrap_or(max.saturating_add(1));
            return into_http(state.dispatcher.reject(CodecError::RequestTooLarge { size, max }));
        }
    };
    let soap_action = headers
        .get("soapaction")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    debug!(
        endpoint = %endpoint,
        body_size = body.len(),
        soap_action = ?soap_action,
        "SOAP POST received"
    );

    let dispatcher = Arc::clone(&state.dispatcher);
    let result = tokio::task::spawn_blocking(move || {
        let mut request = SoapRequest::post(&body, &endpoint);
        if let Some(action) = soap_action.as_deref() {
            request = request.with_soap_action(action);
        }
        dispatcher.handle(&request)
    })
    .await;

    match result {
        Ok(response) => into_http(response),
        Err(err) => {
            error!(error = %err, "Dispatch task failed");
            let fault = Fault::server("Request processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, CONTENT_TYPE)],
                soap_fault_response(&fault),
            )
                .into_response()
        }
    }
}

fn into_http(response: SoapResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}

/// `?wsdl`, `?WSDL` and `?wsdl=` all count.
fn is_wsdl_query(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        q.split('&')
            .any(|pair| pair.split('=').next().is_some_and(|key| key.eq_ignore_ascii_case("wsdl")))
    })
}

fn endpoint_url(headers: &HeaderMap, path: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}{}", host, path)
}
