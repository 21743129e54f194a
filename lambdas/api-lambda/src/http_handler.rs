use std::sync::Arc;

use analysis_block::{validate_upload, UploadFile};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lambda_http::{
    http::{
        header::{HeaderValue, SET_COOKIE, VARY},
        Method, StatusCode,
    },
    Body, Error, Request, Response,
};
use serde::Deserialize;
use wastelens_atoms::users::Session;
use wastelens_atoms::StoreError;
use wastelens_shared::{auth, responses, AppState};

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct SignUpRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    #[serde(default)]
    name: Option<String>,
    content_type: String,
    data: String,
    /// Taken with the device camera; the name is generated from the capture time.
    #[serde(default)]
    camera: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Preflight,
    Login,
    SignUp,
    Logout,
    Me,
    ListImages,
    UploadImage,
    GetImage(&'a str),
    ProcessImage(&'a str),
    RemoveImage(&'a str),
    Dashboard,
    MethodNotAllowed,
    NotFound,
}

fn route<'a>(method: &Method, path: &'a str) -> Route<'a> {
    if method == Method::OPTIONS {
        return Route::Preflight;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match (segments.as_slice(), method) {
        (["login"], &Method::POST) => Route::Login,
        (["signup"], &Method::POST) => Route::SignUp,
        (["logout"], &Method::POST) => Route::Logout,
        (["users", "me"], &Method::GET) => Route::Me,
        (["images"], &Method::GET) => Route::ListImages,
        (["images"], &Method::POST) => Route::UploadImage,
        (["images", id], &Method::GET) => Route::GetImage(*id),
        (["images", id], &Method::DELETE) => Route::RemoveImage(*id),
        (["images", id, "process"], &Method::POST) => Route::ProcessImage(*id),
        (["dashboard"], &Method::GET) => Route::Dashboard,
        (["login"] | ["signup"] | ["logout"] | ["users", "me"] | ["images"] | ["dashboard"], _)
        | (["images", _] | ["images", _, "process"], _) => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

fn with_cors_headers(mut resp: Response<Body>, cors_origin: &str) -> Response<Body> {
    let headers = resp.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_str(cors_origin)
            .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:5173")),
    );
    headers.insert("Access-Control-Allow-Credentials", HeaderValue::from_static("true"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET,POST,DELETE,OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type,Authorization,Cookie"),
    );
    headers.append(VARY, HeaderValue::from_static("Origin"));
    resp
}

fn with_set_cookie(mut resp: Response<Body>, cookie: &str) -> Response<Body> {
    if let Ok(v) = HeaderValue::from_str(cookie) {
        resp.headers_mut().append(SET_COOKIE, v);
    }
    resp
}

/// Main Lambda handler - routes requests to auth or image endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let request_origin = event.headers().get("Origin").and_then(|v| v.to_str().ok());
    let cors_origin = state.config.cors_origin(request_origin);
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    let resp = match route(method, path) {
        Route::Preflight => Response::builder()
            .status(StatusCode::OK)
            .body(Body::Empty)
            .map_err(Box::new)?,
        Route::Login => login(&state, event.body()).await?,
        Route::SignUp => signup(&state, event.body()).await?,
        Route::Logout => logout(&state, &event).await?,
        Route::Me => me(&state.session_for(event.headers())).await?,
        Route::ListImages => {
            let session = state.session_for(event.headers());
            match state.images.list(&session).await {
                Ok(images) => responses::json_response(StatusCode::OK, &images)?,
                Err(e) => responses::store_error_response(&e)?,
            }
        }
        Route::UploadImage => upload(&state, &event).await?,
        Route::GetImage(id) => {
            let session = state.session_for(event.headers());
            match state.images.get(&session, id).await {
                Ok(image) => responses::json_response(StatusCode::OK, &image)?,
                Err(e) => responses::store_error_response(&e)?,
            }
        }
        Route::ProcessImage(id) => {
            let session = state.session_for(event.headers());
            match state.images.process(&session, id).await {
                Ok(image) => responses::json_response(StatusCode::OK, &image)?,
                Err(e) => responses::store_error_response(&e)?,
            }
        }
        Route::RemoveImage(id) => {
            let session = state.session_for(event.headers());
            match state.images.remove(&session, id).await {
                Ok(()) => responses::no_content()?,
                Err(e) => responses::store_error_response(&e)?,
            }
        }
        Route::Dashboard => {
            let session = state.session_for(event.headers());
            match state.images.stats(&session).await {
                Ok(stats) => responses::json_response(StatusCode::OK, &stats)?,
                Err(e) => responses::store_error_response(&e)?,
            }
        }
        Route::MethodNotAllowed => responses::method_not_allowed()?,
        Route::NotFound => responses::not_found()?,
    };

    Ok(with_cors_headers(resp, &cors_origin))
}

async fn login(state: &AppState, body: &Body) -> Result<Response<Body>, Error> {
    let Ok(req) = serde_json::from_slice::<LoginRequest>(body.as_ref()) else {
        return responses::error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };

    let session = Session::new(state.identity.clone());
    let principal = match session.sign_in(&req.username, &req.password).await {
        Ok(principal) => principal,
        Err(e) => return responses::auth_error_response(&e),
    };

    let Some(tokens) = session.tokens().await else {
        return responses::error_response(StatusCode::INTERNAL_SERVER_ERROR, "Session not established");
    };

    let resp = responses::json_response(
        StatusCode::OK,
        &serde_json::json!({ "user": principal, "tokens": tokens }),
    )?;
    Ok(with_set_cookie(
        resp,
        &auth::access_token_cookie(&tokens.access_token, tokens.expires_in),
    ))
}

async fn signup(state: &AppState, body: &Body) -> Result<Response<Body>, Error> {
    let Ok(req) = serde_json::from_slice::<SignUpRequest>(body.as_ref()) else {
        return responses::error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };

    let session = Session::new(state.identity.clone());
    match session.sign_up(&req.username, &req.email, &req.password).await {
        Ok(outcome) => responses::json_response(StatusCode::CREATED, &outcome),
        Err(e) => responses::auth_error_response(&e),
    }
}

async fn logout(state: &AppState, event: &Request) -> Result<Response<Body>, Error> {
    let session = state.session_for(event.headers());
    if let Err(e) = session.sign_out().await {
        // The cookie is cleared even if the remote revoke fails.
        tracing::warn!("Remote sign-out failed: {}", e);
    }

    let resp = responses::json_response(StatusCode::OK, &serde_json::json!({ "message": "ok" }))?;
    Ok(with_set_cookie(resp, &auth::clear_access_token_cookie()))
}

async fn me(session: &Session) -> Result<Response<Body>, Error> {
    match session.current_principal().await {
        Ok(Some(principal)) => responses::json_response(StatusCode::OK, &principal),
        Ok(None) => responses::store_error_response(&StoreError::Unauthenticated),
        Err(e) => responses::store_error_response(&e.into()),
    }
}

async fn upload(state: &AppState, event: &Request) -> Result<Response<Body>, Error> {
    // The caller is resolved before the payload is looked at.
    let session = state.session_for(event.headers());
    match session.current_principal().await {
        Ok(Some(_)) => {}
        Ok(None) => return responses::store_error_response(&StoreError::Unauthenticated),
        Err(e) => return responses::store_error_response(&e.into()),
    }

    let Ok(req) = serde_json::from_slice::<UploadRequest>(event.body().as_ref()) else {
        return responses::error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };

    let file = match upload_file(req) {
        Ok(file) => file,
        Err(e) => return responses::store_error_response(&e),
    };

    if let Err(e) = validate_upload(&file, &state.config.upload_limits) {
        return responses::store_error_response(&e);
    }

    match state.images.upload(&session, file).await {
        Ok(image) => responses::json_response(StatusCode::CREATED, &image),
        Err(e) => responses::store_error_response(&e),
    }
}

fn upload_file(req: UploadRequest) -> Result<UploadFile, StoreError> {
    // Accept both bare base64 and `data:<type>;base64,<payload>` URLs.
    let payload = match req.data.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => req.data.as_str(),
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| StoreError::InvalidUpload(format!("data is not valid base64: {}", e)))?;

    if req.camera {
        let mut file = UploadFile::camera_capture(bytes, chrono::Utc::now());
        file.content_type = req.content_type;
        return Ok(file);
    }

    match req.name.filter(|n| !n.trim().is_empty()) {
        Some(name) => Ok(UploadFile::new(name, req.content_type, bytes)),
        None => Err(StoreError::InvalidUpload("name is required".to_string())),
    }
}
