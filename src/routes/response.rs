//! Response envelopes and request helpers shared by all routes
//!
//! Success: `{"status":"success","data":...}`
//! Failure: `{"status":"error","message":...,"code":...}`

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, AUTHORIZATION, CONTENT_TYPE,
};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::auth::gate::Caller;
use crate::auth::jwt::{extract_token_from_header, JwtValidator, TokenType};
use crate::types::{MeritError, Result};

pub type HttpResponse = Response<Full<Bytes>>;

#[derive(Serialize)]
struct SuccessEnvelope<'a, T: Serialize> {
    status: &'static str,
    data: &'a T,
}

#[derive(Serialize)]
struct MessageEnvelope<'a> {
    status: &'static str,
    message: &'a str,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    status: &'static str,
    message: &'a str,
    code: &'static str,
}

fn with_body(status: StatusCode, content_type: &'static str, body: Bytes) -> HttpResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(json) => with_body(status, "application/json", Bytes::from(json)),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            with_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "application/json",
                Bytes::from_static(
                    br#"{"status":"error","message":"Internal server error","code":"INTERNAL_ERROR"}"#,
                ),
            )
        }
    }
}

pub fn success<T: Serialize>(status: StatusCode, data: &T) -> HttpResponse {
    json_response(
        status,
        &SuccessEnvelope {
            status: "success",
            data,
        },
    )
}

pub fn ok<T: Serialize>(data: &T) -> HttpResponse {
    success(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: &T) -> HttpResponse {
    success(StatusCode::CREATED, data)
}

pub fn message(status: StatusCode, message: &str) -> HttpResponse {
    json_response(
        status,
        &MessageEnvelope {
            status: "success",
            message,
        },
    )
}

/// Error envelope. Infrastructure failures are logged in full here and
/// reported generically.
pub fn error_response(err: &MeritError) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        error!(code = err.code(), retryable = err.is_retryable(), "Request failed: {}", err);
    } else {
        debug!(code = err.code(), "Request rejected: {}", err);
    }
    let message = err.public_message();
    json_response(
        status,
        &ErrorEnvelope {
            status: "error",
            message: &message,
            code: err.code(),
        },
    )
}

pub fn not_found(path: &str) -> HttpResponse {
    error_response(&MeritError::NotFound(format!("no route for {}", path)))
}

pub fn cors_preflight() -> HttpResponse {
    let mut response = with_body(StatusCode::NO_CONTENT, "text/plain", Bytes::new());
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, X-File-Name"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

/// Raw file response for served uploads.
pub fn file_response(bytes: Vec<u8>) -> HttpResponse {
    with_body(StatusCode::OK, "application/octet-stream", Bytes::from(bytes))
}

/// Parse a JSON body. An empty body parses as `{}`.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw).map_err(|e| MeritError::Validation(format!("Invalid JSON: {}", e)))
}

pub fn query_params<T: DeserializeOwned + Default>(req: &Request<Bytes>) -> Result<T> {
    match req.uri().query() {
        None | Some("") => Ok(T::default()),
        Some(query) => serde_urlencoded::from_str(query)
            .map_err(|e| MeritError::Validation(format!("Invalid query string: {}", e))),
    }
}

pub fn header<'a>(req: &'a Request<Bytes>, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the caller from an access token in the `Authorization` header.
pub fn authenticate(jwt: &JwtValidator, req: &Request<Bytes>) -> Result<Caller> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_token_from_header(auth_header)
        .ok_or_else(|| MeritError::Unauthorized("missing bearer token".into()))?;
    let claims = jwt.verify_token(token, TokenType::Access).into_claims()?;
    Ok(claims.caller())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: HttpResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let response = ok(&serde_json::json!({"id": "a1"}));
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["id"], "a1");
    }

    #[tokio::test]
    async fn test_error_envelope_hides_infrastructure_detail() {
        let response = error_response(&MeritError::Database("disk I/O error at /var/db".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "DATABASE_ERROR");
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_conflict_envelope() {
        let response = error_response(&MeritError::Conflict("cannot submit".into()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["message"], "cannot submit");
    }

    #[test]
    fn test_parse_json_empty_body() {
        #[derive(serde::Deserialize)]
        struct Optional {
            points: Option<i64>,
        }
        let parsed: Optional = parse_json(&Bytes::new()).unwrap();
        assert!(parsed.points.is_none());
        assert!(parse_json::<Optional>(&Bytes::from_static(b"{oops")).is_err());
    }

    #[test]
    fn test_authenticate_requires_access_token() {
        let jwt = JwtValidator::new_dev();
        let input = crate::auth::jwt::TokenInput {
            user_id: "u1".into(),
            role_id: "r1".into(),
            username: "sari".into(),
        };
        let access = jwt.generate_token(&input).unwrap();
        let refresh = jwt.generate_refresh_token(&input).unwrap();

        let req = |token: &str| {
            Request::builder()
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .body(Bytes::new())
                .unwrap()
        };

        let caller = authenticate(&jwt, &req(&access)).unwrap();
        assert_eq!(caller, Caller::new("u1", "r1"));
        assert!(matches!(
            authenticate(&jwt, &req(&refresh)),
            Err(MeritError::Unauthorized(_))
        ));

        let anonymous = Request::builder().body(Bytes::new()).unwrap();
        assert!(matches!(
            authenticate(&jwt, &anonymous),
            Err(MeritError::Unauthorized(_))
        ));
    }
}
