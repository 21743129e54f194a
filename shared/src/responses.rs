use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;
use wastelens_atoms::{AuthError, StoreError};

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

pub fn error_response(status: StatusCode, message: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::json!({ "error": message }).to_string().into())
        .map_err(Box::new)?)
}

pub fn no_content() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub fn not_found() -> Result<Response<Body>, Error> {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

pub fn store_error_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyProcessed(_) => StatusCode::CONFLICT,
        StoreError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
        StoreError::Remote(_)
        | StoreError::Malformed(_)
        | StoreError::Io(_)
        | StoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::Remote(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn store_error_response(err: &StoreError) -> Result<Response<Body>, Error> {
    let status = store_error_status(err);
    if status.is_server_error() {
        tracing::error!("Image store failure: {}", err);
        return error_response(status, "Internal server error");
    }
    error_response(status, &err.to_string())
}

pub fn auth_error_response(err: &AuthError) -> Result<Response<Body>, Error> {
    let status = auth_error_status(err);
    if status.is_server_error() {
        tracing::error!("Identity provider failure: {}", err);
    }
    error_response(status, &err.to_string())
}
