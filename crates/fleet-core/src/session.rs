//! The authenticated backend session, as seen by the poll loop.
//!
//! The loop only needs two operations from the backend: a single call and
//! an order-preserving batched call. Authentication, transport, and wire
//! format belong to whoever implements [`FleetSession`].

use std::future::Future;

use serde_json::{Map, Value};

use crate::error::BackendError;

/// Backend method used for every read the poll loop issues.
pub const GET_METHOD: &str = "Get";

/// One backend request: a method applied to an entity type with
/// method-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    /// Backend method name (e.g. `Get`).
    pub method: String,
    /// Backend entity type the method applies to (e.g. `Device`).
    pub type_name: String,
    /// Additional parameters such as `search` or `propertySelector`.
    pub params: Map<String, Value>,
}

impl ApiCall {
    /// Build a `Get` call for `type_name` with the given parameters.
    pub fn get(type_name: &str, params: Map<String, Value>) -> Self {
        Self {
            method: GET_METHOD.to_owned(),
            type_name: type_name.to_owned(),
            params,
        }
    }
}

/// An authenticated session against the fleet backend.
///
/// Implementations must classify every failure into a
/// [`BackendError`] kind; the poll loop relies on that tag alone.
pub trait FleetSession: Sync {
    /// Issue a single call and return its raw result.
    fn call(&self, call: &ApiCall) -> impl Future<Output = Result<Value, BackendError>> + Send;

    /// Issue several calls in one round trip.
    ///
    /// Returns exactly one result per call, in request order.
    fn multi_call(
        &self,
        calls: &[ApiCall],
    ) -> impl Future<Output = Result<Vec<Value>, BackendError>> + Send;
}
