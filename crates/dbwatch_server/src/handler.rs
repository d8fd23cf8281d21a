//! Request routing and dispatch for the REST surface.

use crate::error::{ServerError, ServerResult};
use crate::server::ApiServer;
use dbwatch_api::{
    api_version, decode_object, encode_list, encode_object, encode_status, DeleteOptions,
    ListOptions, ObjectKey, API_PATH, PLURAL,
};
use dbwatch_client::{ByteStream, Method, RestRequest, RestResponse};
use tracing::debug;

/// A request path resolved against the `databases` resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Namespace segment, if the path had one.
    pub namespace: Option<String>,
    /// Object name, `None` for the collection.
    pub name: Option<String>,
}

impl Route {
    /// Key of the named object.
    pub fn key(&self) -> Option<ObjectKey> {
        self.name.as_ref().map(|name| ObjectKey {
            namespace: self.namespace.clone(),
            name: name.clone(),
        })
    }
}

/// Resolves a request path.
///
/// Accepted shapes, relative to `/apis/<group>/<version>/`:
/// `databases`, `databases/{name}`, `namespaces/{ns}/databases` and
/// `namespaces/{ns}/databases/{name}`.
pub fn route(path: &str) -> Option<Route> {
    let prefix = format!("{}/{}/", API_PATH, api_version());
    let rest = path.strip_prefix(prefix.as_str())?;
    let segments: Vec<&str> = rest
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match segments.as_slice() {
        [plural] if *plural == PLURAL => Some(Route {
            namespace: None,
            name: None,
        }),
        [plural, name] if *plural == PLURAL => Some(Route {
            namespace: None,
            name: Some((*name).to_string()),
        }),
        ["namespaces", ns, plural] if *plural == PLURAL => Some(Route {
            namespace: Some((*ns).to_string()),
            name: None,
        }),
        ["namespaces", ns, plural, name] if *plural == PLURAL => Some(Route {
            namespace: Some((*ns).to_string()),
            name: Some((*name).to_string()),
        }),
        _ => None,
    }
}

/// Dispatches a unary request to the server.
pub(crate) fn handle(server: &ApiServer, request: &RestRequest) -> RestResponse {
    debug!(method = %request.method, path = %request.path, "handling request");
    match dispatch(server, request) {
        Ok(response) => response,
        Err(err) => error_response(&err),
    }
}

/// Opens a watch stream for a `GET ...?watch=true` request.
pub(crate) fn handle_watch(
    server: &ApiServer,
    request: &RestRequest,
) -> Result<ByteStream, RestResponse> {
    debug!(path = %request.path, "handling watch");
    open_watch(server, request).map_err(|err| error_response(&err))
}

fn open_watch(server: &ApiServer, request: &RestRequest) -> ServerResult<ByteStream> {
    let route = route(&request.path).ok_or_else(|| ServerError::NoRoute(request.path.clone()))?;
    if request.method != Method::Get || route.name.is_some() {
        return Err(ServerError::MethodNotAllowed {
            method: request.method.to_string(),
            path: request.path.clone(),
        });
    }
    let options = ListOptions::from_query(&request.query)?;
    server.open_watch(route.namespace.as_deref(), &options)
}

fn dispatch(server: &ApiServer, request: &RestRequest) -> ServerResult<RestResponse> {
    let route = route(&request.path).ok_or_else(|| ServerError::NoRoute(request.path.clone()))?;
    let not_allowed = || ServerError::MethodNotAllowed {
        method: request.method.to_string(),
        path: request.path.clone(),
    };

    match (request.method, route.key()) {
        (Method::Get, None) => {
            let options = ListOptions::from_query(&request.query)?;
            if options.watch {
                return Err(ServerError::BadRequest(
                    "watch requests must be opened as streams".into(),
                ));
            }
            let list = server.list(route.namespace.as_deref(), &options)?;
            ok(200, encode_list(&list)?)
        }
        (Method::Get, Some(key)) => {
            let object = server.get(&key)?;
            ok(200, encode_object(&object)?)
        }
        (Method::Post, None) => {
            let object = decode_object(body(request)?)?;
            let object = server.create(route.namespace.as_deref(), object)?;
            ok(201, encode_object(&object)?)
        }
        (Method::Put, Some(key)) => {
            let object = decode_object(body(request)?)?;
            if object.name() != key.name {
                return Err(ServerError::BadRequest(format!(
                    "name in body ({}) does not match path ({})",
                    object.name(),
                    key.name
                )));
            }
            let object = server.replace(&key, object)?;
            ok(200, encode_object(&object)?)
        }
        (Method::Delete, Some(key)) => {
            let options = DeleteOptions::from_query(&request.query)?;
            let object = server.delete(&key, &options)?;
            ok(200, encode_object(&object)?)
        }
        _ => Err(not_allowed()),
    }
}

fn body(request: &RestRequest) -> ServerResult<&[u8]> {
    request
        .body
        .as_deref()
        .ok_or_else(|| ServerError::BadRequest("request body required".into()))
}

fn ok(status: u16, body: Vec<u8>) -> ServerResult<RestResponse> {
    Ok(RestResponse::new(status, body))
}

/// Renders an error as a `Status` response.
pub(crate) fn error_response(err: &ServerError) -> RestResponse {
    let status = err.to_status();
    let body = encode_status(&status).unwrap_or_else(|_| err.to_string().into_bytes());
    RestResponse::new(status.code, body)
}
