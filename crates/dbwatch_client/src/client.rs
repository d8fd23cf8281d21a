//! Typed client for the `databases` resource.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::{RestRequest, RestResponse, Transport};
use crate::watch::{decode_frames, WatchStream};
use dbwatch_api::{
    api_version, decode_list, decode_object, encode_object, Database, DatabaseList,
    DeleteOptions, GetOptions, ListOptions, GROUP, KIND, PLURAL, VERSION,
};
use std::sync::Arc;
use tracing::debug;

/// Client bound to the `Database` kind.
///
/// Hides endpoint paths and query encoding. Every call maps one-to-one to
/// a remote request: there is no caching and no retry at this layer.
///
/// # Example
///
/// ```rust,ignore
/// use dbwatch_client::{ClientConfig, DatabaseClient, HttpTransport};
/// use dbwatch_api::ListOptions;
///
/// let config = ClientConfig::from_kubeconfig("vke.yaml".as_ref())?;
/// let client = DatabaseClient::new(config.clone(), HttpTransport::new(&config)?);
///
/// for db in client.list(&ListOptions::default()).await?.items {
///     println!("{}", db.name());
/// }
/// ```
pub struct DatabaseClient<T: Transport> {
    transport: Arc<T>,
    config: Arc<ClientConfig>,
    namespace: Option<String>,
}

impl<T: Transport> Clone for DatabaseClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
            namespace: self.namespace.clone(),
        }
    }
}

impl<T: Transport> DatabaseClient<T> {
    /// Creates a cluster-scoped client.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
            namespace: None,
        }
    }

    /// Returns a client scoped to one namespace, sharing the transport.
    pub fn namespaced(&self, namespace: impl Into<String>) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
            namespace: Some(namespace.into()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the namespace, `None` when cluster-scoped.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Path of the collection, e.g. `/apis/resource.donald.com/v1/databases`.
    pub fn collection_path(&self) -> String {
        let api_path = self.config.api_path.trim_end_matches('/');
        match self.namespace {
            Some(ref ns) => format!(
                "{}/{}/{}/namespaces/{}/{}",
                api_path, GROUP, VERSION, ns, PLURAL
            ),
            None => format!("{}/{}/{}/{}", api_path, GROUP, VERSION, PLURAL),
        }
    }

    /// Path of one object.
    pub fn object_path(&self, name: &str) -> String {
        format!("{}/{}", self.collection_path(), name)
    }

    /// Lists the collection.
    ///
    /// The list's `metadata.resourceVersion` is the watermark to start a
    /// watch from.
    pub async fn list(&self, options: &ListOptions) -> ClientResult<DatabaseList> {
        let mut options = options.clone();
        options.watch = false;
        let request = RestRequest::get(self.collection_path()).with_query(options.to_query());

        let response = self.send(request).await?;
        let body = expect_success(response, None)?;
        let list = decode_list(&body)?;
        debug!(
            items = list.items.len(),
            resource_version = ?list.metadata.resource_version,
            "listed databases"
        );
        Ok(list)
    }

    /// Gets one object by name.
    pub async fn get(&self, name: &str, options: &GetOptions) -> ClientResult<Database> {
        let request = RestRequest::get(self.object_path(name)).with_query(options.to_query());
        let response = self.send(request).await?;
        let body = expect_success(response, Some(name))?;
        Ok(decode_object(&body)?)
    }

    /// Creates an object and returns it as stored by the server.
    pub async fn create(&self, object: &Database) -> ClientResult<Database> {
        let object = self.prepare(object);
        let body = encode_object(&object)?;
        let request = RestRequest::post(self.collection_path(), body);

        let response = self.send(request).await?;
        let body = expect_success(response, Some(object.name()))?;
        Ok(decode_object(&body)?)
    }

    /// Replaces an existing object.
    ///
    /// When `metadata.resourceVersion` is set the server rejects the write
    /// with `Conflict` if the object changed since that version.
    pub async fn replace(&self, object: &Database) -> ClientResult<Database> {
        let object = self.prepare(object);
        let body = encode_object(&object)?;
        let request = RestRequest::put(self.object_path(object.name()), body);

        let response = self.send(request).await?;
        let body = expect_success(response, Some(object.name()))?;
        Ok(decode_object(&body)?)
    }

    /// Deletes an object and returns its last state.
    ///
    /// Deleting a name that does not exist (including one already deleted)
    /// fails with `NotFound`.
    pub async fn delete(&self, name: &str, options: &DeleteOptions) -> ClientResult<Database> {
        let request = RestRequest::delete(self.object_path(name)).with_query(options.to_query());
        let response = self.send(request).await?;
        let body = expect_success(response, Some(name))?;
        Ok(decode_object(&body)?)
    }

    /// Opens a watch starting after `options.resource_version`.
    ///
    /// The returned stream ends when the server closes it; callers must be
    /// prepared to relist.
    pub async fn watch(&self, options: &ListOptions) -> ClientResult<WatchStream> {
        let mut options = options.clone();
        options.watch = true;
        let request = RestRequest::get(self.collection_path()).with_query(options.to_query());

        debug!(
            resource_version = ?options.resource_version,
            "opening watch"
        );
        let body = self.transport.stream(request).await?;
        Ok(decode_frames(body))
    }

    async fn send(&self, request: RestRequest) -> ClientResult<RestResponse> {
        debug!(method = %request.method, path = %request.path, "request");
        self.transport.send(request).await
    }

    /// Fills in type metadata and the client's namespace.
    fn prepare(&self, object: &Database) -> Database {
        let mut object = object.clone();
        if object.type_meta.api_version.is_empty() {
            object.type_meta.api_version = api_version();
        }
        if object.type_meta.kind.is_empty() {
            object.type_meta.kind = KIND.to_string();
        }
        if object.metadata.namespace.is_none() {
            object.metadata.namespace = self.namespace.clone();
        }
        object
    }
}

fn expect_success(response: RestResponse, name: Option<&str>) -> ClientResult<Vec<u8>> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(ClientError::from_response(
            response.status,
            &response.body,
            name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ByteStream, Method};
    use async_trait::async_trait;
    use bytes::Bytes;
    use dbwatch_api::{
        encode_event, encode_list, encode_status, DatabaseSpec, ListMeta, Status, WatchEvent,
    };
    use futures::StreamExt;
    use parking_lot::Mutex;

    /// Replays canned responses and records requests.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<Vec<RestResponse>>,
        frames: Mutex<Vec<Vec<u8>>>,
        requests: Mutex<Vec<RestRequest>>,
    }

    impl ScriptedTransport {
        fn respond(&self, status: u16, body: Vec<u8>) {
            self.responses.lock().push(RestResponse::new(status, body));
        }

        fn last_request(&self) -> RestRequest {
            self.requests.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: RestRequest) -> ClientResult<RestResponse> {
            self.requests.lock().push(request);
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(ClientError::transport_retryable("connection refused"));
            }
            Ok(responses.remove(0))
        }

        async fn stream(&self, request: RestRequest) -> ClientResult<ByteStream> {
            self.requests.lock().push(request);
            let frames: Vec<ClientResult<Bytes>> = self
                .frames
                .lock()
                .drain(..)
                .map(|f| Ok(Bytes::from(f)))
                .collect();
            Ok(Box::pin(futures::stream::iter(frames)))
        }
    }

    fn db(name: &str, available: i64) -> Database {
        Database::new(
            name,
            DatabaseSpec {
                db_name: name.into(),
                description: "test".into(),
                total: 100,
                available,
                db_type: "SQL".into(),
                tags: String::new(),
            },
        )
    }

    fn client() -> DatabaseClient<ScriptedTransport> {
        DatabaseClient::new(ClientConfig::default(), ScriptedTransport::default())
    }

    #[test]
    fn paths() {
        let client = client();
        assert_eq!(
            client.collection_path(),
            "/apis/resource.donald.com/v1/databases"
        );
        assert_eq!(
            client.object_path("mysql"),
            "/apis/resource.donald.com/v1/databases/mysql"
        );
        assert_eq!(
            client.namespaced("prod").object_path("mysql"),
            "/apis/resource.donald.com/v1/namespaces/prod/databases/mysql"
        );
    }

    #[tokio::test]
    async fn list_decodes_collection() {
        let client = client();
        let list = DatabaseList::new(
            vec![db("mysql", 50), db("mongodb", 70)],
            ListMeta {
                resource_version: Some("17".into()),
                continue_token: None,
            },
        );
        client.transport().respond(200, encode_list(&list).unwrap());

        let result = client
            .list(&ListOptions::default().labels("tier=gold"))
            .await
            .unwrap();
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.metadata.resource_version, Some("17".into()));

        let request = client.transport().last_request();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query_param("labelSelector"), Some("tier=gold"));
        assert_eq!(request.query_param("watch"), None);
    }

    #[tokio::test]
    async fn list_of_wrong_kind_is_decode_error() {
        let client = client();
        client.transport().respond(
            200,
            br#"{"apiVersion":"v1","kind":"PodList","items":[]}"#.to_vec(),
        );
        let err = client.list(&ListOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn transport_failure_surfaces_directly() {
        let client = client();
        let err = client.list(&ListOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
        assert_eq!(client.transport().requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn get_not_found() {
        let client = client();
        client
            .transport()
            .respond(404, encode_status(&Status::not_found("mysql")).unwrap());

        let err = client.get("mysql", &GetOptions::default()).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::NotFound {
                name: "mysql".into()
            }
        );
    }

    #[tokio::test]
    async fn create_posts_typed_body() {
        let client = client().namespaced("prod");
        let mut stored = db("mongodb", 70).in_namespace("prod");
        stored.metadata.resource_version = Some("3".into());
        client
            .transport()
            .respond(201, encode_object(&stored).unwrap());

        let mut input = db("mongodb", 70);
        input.type_meta = Default::default();
        let created = client.create(&input).await.unwrap();
        assert_eq!(created, stored);

        let request = client.transport().last_request();
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.path,
            "/apis/resource.donald.com/v1/namespaces/prod/databases"
        );
        let sent = decode_object(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent.type_meta.kind, "Database");
        assert_eq!(sent.metadata.namespace.as_deref(), Some("prod"));
    }

    #[tokio::test]
    async fn create_already_exists() {
        let client = client();
        client
            .transport()
            .respond(409, encode_status(&Status::already_exists("mysql")).unwrap());

        let err = client.create(&db("mysql", 1)).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::AlreadyExists {
                name: "mysql".into()
            }
        );
    }

    #[tokio::test]
    async fn delete_twice_surfaces_not_found() {
        let client = client();
        client
            .transport()
            .respond(200, encode_object(&db("mysql", 1)).unwrap());
        client
            .transport()
            .respond(404, encode_status(&Status::not_found("mysql")).unwrap());

        let deleted = client
            .delete("mysql", &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(deleted.name(), "mysql");
        assert_eq!(client.transport().last_request().method, Method::Delete);

        let err = client
            .delete("mysql", &DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound { .. }));
    }

    #[tokio::test]
    async fn watch_sets_streaming_flag() {
        let client = client();
        for event in [
            WatchEvent::Added(db("redis", 5)),
            WatchEvent::Deleted(db("redis", 5)),
        ] {
            let mut frame = encode_event(&event).unwrap();
            frame.push(b'\n');
            client.transport().frames.lock().push(frame);
        }

        let stream = client
            .watch(&ListOptions::default().at("42"))
            .await
            .unwrap();
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(WatchEvent::Added(_))));

        let request = client.transport().last_request();
        assert_eq!(request.query_param("watch"), Some("true"));
        assert_eq!(request.query_param("resourceVersion"), Some("42"));
    }
}
