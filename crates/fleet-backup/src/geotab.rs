//! JSON-RPC session against the fleet telemetry backend.
//!
//! Every request is a `POST` to `https://{server}/apiv1` with a body of
//! `{"method": ..., "params": ...}`. Answers carry either `result` or an
//! `error` whose inner `errors[].name` identifies the failure; those names,
//! HTTP statuses, and transport faults are all folded into an
//! [`ErrorKind`] here so the poll loop never sees wire details.

use std::time::Duration;

use fleet_core::error::{BackendError, ErrorKind};
use fleet_core::session::{ApiCall, FleetSession};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::config::LoginArgs;

/// Path of the JSON-RPC endpoint on every backend host.
const API_PATH: &str = "apiv1";

/// Login `path` meaning "keep using the host you authenticated against".
const THIS_SERVER: &str = "ThisServer";

/// Token set returned by `Authenticate` and sent with every later call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct SessionCredentials {
    database: String,
    session_id: String,
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    credentials: SessionCredentials,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: Option<String>,
    name: Option<String>,
    #[serde(default)]
    errors: Vec<RpcErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorDetail {
    name: Option<String>,
    message: Option<String>,
}

/// An authenticated backend session.
pub struct GeotabSession {
    client: reqwest::Client,
    endpoint: String,
    credentials: SessionCredentials,
}

impl GeotabSession {
    /// Log in and return a session bound to the server the backend
    /// assigns.
    ///
    /// # Errors
    ///
    /// Returns a classified [`BackendError`] if the login is rejected or
    /// the backend cannot be reached.
    pub async fn authenticate(login: &LoginArgs, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::transport(format!("failed to build HTTP client: {e}")))?;

        let login_endpoint = endpoint_for(&login.server);
        info!(
            endpoint = login_endpoint,
            database = login.database,
            user = login.username,
            "authenticating"
        );

        let params = json!({
            "database": login.database,
            "userName": login.username,
            "password": login.password,
        });
        let result = invoke(&client, &login_endpoint, "Authenticate", params).await?;
        let login_result = LoginResult::deserialize(&result)?;

        let endpoint = match login_result.path.as_deref() {
            None | Some("" | THIS_SERVER) => login_endpoint,
            Some(host) => endpoint_for(host),
        };
        info!(endpoint = endpoint, "authenticated");

        Ok(Self {
            client,
            endpoint,
            credentials: login_result.credentials,
        })
    }

    fn call_params(&self, call: &ApiCall) -> Value {
        let mut params = params_for(call);
        params.insert(String::from("credentials"), json!(self.credentials));
        Value::Object(params)
    }
}

impl FleetSession for GeotabSession {
    async fn call(&self, call: &ApiCall) -> Result<Value, BackendError> {
        invoke(&self.client, &self.endpoint, &call.method, self.call_params(call)).await
    }

    async fn multi_call(&self, calls: &[ApiCall]) -> Result<Vec<Value>, BackendError> {
        let batch: Vec<Value> = calls
            .iter()
            .map(|c| json!({ "method": c.method, "params": params_for(c) }))
            .collect();
        let params = json!({ "calls": batch, "credentials": self.credentials });

        let result = invoke(&self.client, &self.endpoint, "ExecuteMultiCall", params).await?;
        Ok(Vec::<Value>::deserialize(&result)?)
    }
}

/// Build the JSON-RPC endpoint URL for a host.
fn endpoint_for(host: &str) -> String {
    format!("https://{}/{API_PATH}", host.trim_end_matches('/'))
}

/// `params` of a call without credentials: `typeName` plus the call's own
/// parameters.
fn params_for(call: &ApiCall) -> Map<String, Value> {
    let mut params = call.params.clone();
    params.insert(
        String::from("typeName"),
        Value::String(call.type_name.clone()),
    );
    params
}

/// Send one JSON-RPC request and unwrap its result.
async fn invoke(
    client: &reqwest::Client,
    endpoint: &str,
    method: &str,
    params: Value,
) -> Result<Value, BackendError> {
    let body = json!({ "method": method, "params": params });
    debug!(endpoint = endpoint, method = method, "sending request");

    let response = client
        .post(endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|e| classify_reqwest(&e))?;

    let status = response.status();
    if let Some(kind) = classify_status(status) {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());
        return Err(BackendError::new(
            kind,
            format!("{method} returned {status}: {error_body}"),
        ));
    }

    let text = response.text().await.map_err(|e| classify_reqwest(&e))?;
    parse_response(&text)
}

/// Unwrap a JSON-RPC response body.
///
/// A missing `result` decodes as `null`.
fn parse_response(body: &str) -> Result<Value, BackendError> {
    let response: RpcResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(classify_rpc_error(&error));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Turn a backend error object into a classified error.
///
/// The first inner error's name wins over the outer one, which is usually
/// the generic `JSONRPCError`.
fn classify_rpc_error(error: &RpcError) -> BackendError {
    let detail = error.errors.first();
    let name = detail
        .and_then(|d| d.name.as_deref())
        .or(error.name.as_deref())
        .unwrap_or("UnknownError");
    let message = detail
        .and_then(|d| d.message.as_deref())
        .or(error.message.as_deref())
        .unwrap_or("no message");

    BackendError::new(classify_error_name(name), format!("{name}: {message}"))
}

/// Map a backend exception name to an [`ErrorKind`].
fn classify_error_name(name: &str) -> ErrorKind {
    match name {
        "InvalidUserException" => ErrorKind::InvalidCredentials,
        "DbUnavailableException" => ErrorKind::DatabaseUnavailable,
        "OverLimitException" => ErrorKind::RateLimited,
        "InvalidApiOperationException" | "MissingMethodException" | "ArgumentException"
        | "ArgumentNullException" | "ArgumentOutOfRangeException" => ErrorKind::InvalidOperation,
        "JsonSerializerException" => ErrorKind::Serialization,
        _ => ErrorKind::Unclassified,
    }
}

/// Map a non-success HTTP status to an [`ErrorKind`]; `None` for success.
fn classify_status(status: StatusCode) -> Option<ErrorKind> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(ErrorKind::RateLimited)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        Some(ErrorKind::Transport)
    } else if status.is_client_error() {
        Some(ErrorKind::InvalidOperation)
    } else {
        Some(ErrorKind::Unclassified)
    }
}

fn classify_reqwest(e: &reqwest::Error) -> BackendError {
    if e.is_decode() {
        BackendError::serialization(format!("response decode failed: {e}"))
    } else {
        BackendError::transport(format!("request failed: {e}"))
    }
}
