//! The client orchestrator: schema acquisition, validation, retries, result
//! post-processing, and the scoped [`Session`] over a subscription-capable
//! transport.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt as _};

use crate::{
    adaptor::{ScalarAdaptor, ScalarAdaptors, TypeAdaptor},
    ast::{self, Document, OperationKind},
    error::Error,
    execution::{ExecutionResult, Variables},
    schema::{INTROSPECTION_QUERY, Schema},
    transport::{LocalSchemaTransport, Request, SubscriptionTransport, Transport, TransportError},
};

/// The stream of post-processed data items produced by a subscription.
pub type DataStream = BoxStream<'static, Result<serde_json::Value, Error>>;

const RETRY_BACKOFF_FACTOR: Duration = Duration::from_millis(100);

/// A GraphQL client over a transport `T`.
///
/// Holds the (optional) schema used for local validation, the custom scalar
/// adaptors applied to results, and the retry budget for unary execution.
/// Constructed through [`Client::builder`].
pub struct Client<T> {
    transport: Arc<T>,
    schema: RwLock<Option<Arc<Schema>>>,
    introspection: RwLock<Option<serde_json::Value>>,
    adaptors: Arc<ScalarAdaptors>,
    retries: u32,
    fetch_schema_from_transport: bool,
}

impl<T: Transport> Client<T> {
    /// Starts building a client.
    pub fn builder() -> ClientBuilder<T> {
        ClientBuilder::new()
    }

    /// The schema currently known to the client, if any.
    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The raw introspection result the schema was built from, if that is
    /// how it was obtained.
    pub fn introspection(&self) -> Option<serde_json::Value> {
        self.introspection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The transport requests are executed over.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn install_schema(&self, schema: Arc<Schema>, raw: Option<serde_json::Value>) {
        *self.schema.write().unwrap_or_else(PoisonError::into_inner) = Some(schema);
        *self
            .introspection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = raw;
    }

    /// Validates a document against the known schema.
    ///
    /// Fails with [`Error::Syntax`] when no schema is known, and with
    /// [`Error::Validation`] carrying every violation otherwise. Pure; no
    /// I/O.
    pub fn validate(&self, document: &Document) -> Result<(), Error> {
        let Some(schema) = self.schema() else {
            return Err(Error::Syntax(
                "cannot validate the document locally, the client has no schema".into(),
            ));
        };
        let errors = schema.validate(document);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }

    /// Executes a unary operation and returns its post-processed `data`.
    pub async fn execute(
        &self,
        document: &Document,
        variables: Option<Variables>,
    ) -> Result<serde_json::Value, Error> {
        let request = Request::new(document);
        match &variables {
            Some(variables) => self.execute_request(request.variables(variables)).await,
            None => self.execute_request(request).await,
        }
    }

    /// Executes a unary operation described by a full [`Request`].
    ///
    /// Validates when a schema is known, runs the transport under the retry
    /// policy, turns a result with errors into [`Error::Server`], and
    /// applies the configured scalar adaptors to the data.
    pub async fn execute_request(&self, request: Request<'_>) -> Result<serde_json::Value, Error> {
        if self.schema().is_some() {
            self.validate(request.document)?;
        }

        let result = self.execute_with_retries(request).await?;
        if let Some(first) = result.first_error() {
            return Err(Error::Server(first.clone()));
        }

        let data = result.data.unwrap_or(serde_json::Value::Null);
        self.adapt(request.document, request.operation_name, data)
    }

    async fn execute_with_retries(
        &self,
        request: Request<'_>,
    ) -> Result<ExecutionResult, Error> {
        let mut attempts = 0u32;
        loop {
            match self.transport.execute(request).await {
                Ok(result) => return Ok(result),
                Err(error) if self.retries == 0 || !error.is_retryable() => {
                    return Err(Error::Transport(error));
                }
                Err(error) => {
                    attempts += 1;
                    if attempts >= self.retries {
                        return Err(Error::Retry {
                            attempts,
                            source: error,
                        });
                    }
                    tracing::warn!(
                        error = %error,
                        attempt = attempts,
                        "request failed, retrying",
                    );
                    tokio::time::sleep(RETRY_BACKOFF_FACTOR * 2u32.pow(attempts - 1)).await;
                }
            }
        }
    }

    fn adapt(
        &self,
        document: &Document,
        operation_name: Option<&str>,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, Error> {
        if self.adaptors.is_empty() {
            return Ok(data);
        }
        let Some(schema) = self.schema() else {
            return Ok(data);
        };
        let Ok(operation) = ast::find_operation(document, operation_name) else {
            return Ok(data);
        };
        let Some(root) = schema.root_type_name(ast::operation_kind(operation)) else {
            return Ok(data);
        };
        TypeAdaptor::new(&schema, &self.adaptors)
            .apply(root, data)
            .map_err(Into::into)
    }
}

impl<T: SubscriptionTransport + 'static> Client<T> {
    /// Opens the transport connection and returns a scoped session over it.
    ///
    /// When the client was built with `fetch_schema_from_transport`, the
    /// schema is fetched right after connecting (unless one is already
    /// known). The connection is released when the session is
    /// [`close`](Session::close)d or dropped.
    pub async fn session(&self) -> Result<Session<'_, T>, Error> {
        self.transport.connect().await.map_err(Error::Transport)?;
        let session = Session {
            client: self,
            closed: false,
        };
        if self.fetch_schema_from_transport && self.schema().is_none() {
            if let Err(error) = session.fetch_schema().await {
                let _ = self.transport.close().await;
                return Err(error);
            }
        }
        Ok(session)
    }

    /// Starts a subscription and returns the stream of post-processed data
    /// items.
    ///
    /// The stream ends cleanly when the server completes the subscription; a
    /// server-sent `error` frame surfaces as
    /// [`TransportError::Query`] wrapped in [`Error::Transport`] and ends
    /// the stream.
    pub async fn subscribe(
        &self,
        document: &Document,
        variables: Option<Variables>,
    ) -> Result<DataStream, Error> {
        let request = Request::new(document);
        match &variables {
            Some(variables) => self.subscribe_request(request.variables(variables)).await,
            None => self.subscribe_request(request).await,
        }
    }

    /// Starts a subscription described by a full [`Request`].
    pub async fn subscribe_request(&self, request: Request<'_>) -> Result<DataStream, Error> {
        if self.schema().is_some() {
            self.validate(request.document)?;
        }

        let kind = ast::find_operation(request.document, request.operation_name)
            .map(ast::operation_kind)
            .unwrap_or(OperationKind::Subscription);

        let stream = self
            .transport
            .subscribe(request)
            .await
            .map_err(Error::Transport)?;

        let schema = self.schema();
        let adaptors = Arc::clone(&self.adaptors);
        let root = schema
            .as_ref()
            .and_then(|s| s.root_type_name(kind))
            .map(str::to_owned);

        Ok(stream
            .map(move |item| {
                let result = item.map_err(Error::Transport)?;
                if let Some(first) = result.first_error() {
                    return Err(Error::Server(first.clone()));
                }
                let data = result.data.unwrap_or(serde_json::Value::Null);
                match (&schema, &root) {
                    (Some(schema), Some(root)) if !adaptors.is_empty() => {
                        TypeAdaptor::new(schema, &adaptors)
                            .apply(root, data)
                            .map_err(Into::into)
                    }
                    _ => Ok(data),
                }
            })
            .boxed())
    }
}

/// Builds a [`Client`].
///
/// At most one of [`schema`](Self::schema), [`type_defs`](Self::type_defs)
/// and [`introspection`](Self::introspection) may be supplied; a second
/// source fails [`build`](Self::build) with [`Error::Config`].
pub struct ClientBuilder<T> {
    transport: Option<T>,
    schema: Option<Schema>,
    type_defs: Option<String>,
    introspection: Option<serde_json::Value>,
    fetch_schema_from_transport: bool,
    adaptors: ScalarAdaptors,
    retries: u32,
}

impl<T: Transport> ClientBuilder<T> {
    fn new() -> Self {
        Self {
            transport: None,
            schema: None,
            type_defs: None,
            introspection: None,
            fetch_schema_from_transport: false,
            adaptors: ScalarAdaptors::new(),
            retries: 0,
        }
    }

    /// Sets the transport requests execute over.
    #[must_use]
    pub fn transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Supplies an already built schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Supplies SDL type definitions to build the schema from.
    #[must_use]
    pub fn type_defs(mut self, sdl: impl Into<String>) -> Self {
        self.type_defs = Some(sdl.into());
        self
    }

    /// Supplies an introspection result to build the schema from.
    #[must_use]
    pub fn introspection(mut self, introspection: serde_json::Value) -> Self {
        self.introspection = Some(introspection);
        self
    }

    /// Fetches the schema through the transport when a session opens.
    #[must_use]
    pub fn fetch_schema_from_transport(mut self, fetch: bool) -> Self {
        self.fetch_schema_from_transport = fetch;
        self
    }

    /// Registers a custom scalar adaptor under the scalar's type name.
    #[must_use]
    pub fn custom_scalar(
        mut self,
        name: impl Into<String>,
        adaptor: Arc<dyn ScalarAdaptor>,
    ) -> Self {
        self.adaptors.insert(name.into(), adaptor);
        self
    }

    /// Sets the number of attempts made for a unary execution before giving
    /// up with [`Error::Retry`]. Zero (the default) disables retrying.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Builds the client.
    pub fn build(mut self) -> Result<Client<T>, Error> {
        let schema = self.resolve_schema()?;
        let Some(transport) = self.transport.take() else {
            return Err(Error::Config(
                "a transport is required (supply a schema and build_local() for in-process \
                 execution)"
                    .into(),
            ));
        };
        Ok(self.assemble(transport, schema))
    }

    fn resolve_schema(&mut self) -> Result<Option<Arc<Schema>>, Error> {
        let supplied = [
            self.schema.is_some(),
            self.type_defs.is_some(),
            self.introspection.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();
        if supplied > 1 {
            return Err(Error::Config(
                "supply at most one of schema, type_defs and introspection".into(),
            ));
        }

        if let Some(schema) = self.schema.take() {
            Ok(Some(Arc::new(schema)))
        } else if let Some(sdl) = self.type_defs.take() {
            Ok(Some(Arc::new(Schema::from_type_definitions(&sdl)?)))
        } else if let Some(introspection) = &self.introspection {
            Ok(Some(Arc::new(Schema::from_introspection(introspection)?)))
        } else {
            Ok(None)
        }
    }

    fn assemble(self, transport: T, schema: Option<Arc<Schema>>) -> Client<T> {
        Client {
            transport: Arc::new(transport),
            schema: RwLock::new(schema),
            introspection: RwLock::new(self.introspection),
            adaptors: Arc::new(self.adaptors),
            retries: self.retries,
            fetch_schema_from_transport: self.fetch_schema_from_transport,
        }
    }
}

impl ClientBuilder<LocalSchemaTransport> {
    /// Builds a client that executes in process against the supplied schema,
    /// synthesizing a [`LocalSchemaTransport`] when none was given.
    pub fn build_local(mut self) -> Result<Client<LocalSchemaTransport>, Error> {
        let schema = self.resolve_schema()?;
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                let Some(schema) = &schema else {
                    return Err(Error::Config("local execution requires a schema".into()));
                };
                LocalSchemaTransport::new(Arc::clone(schema))
            }
        };
        Ok(self.assemble(transport, schema))
    }
}

/// A scoped handle over an open transport connection.
///
/// Acquired from [`Client::session`]; closing (or dropping) it releases the
/// connection, terminating every outstanding subscription stream with
/// [`TransportError::Closed`].
pub struct Session<'a, T: SubscriptionTransport + 'static> {
    client: &'a Client<T>,
    closed: bool,
}

impl<T: SubscriptionTransport + 'static> Session<'_, T> {
    /// The client this session belongs to.
    pub fn client(&self) -> &Client<T> {
        self.client
    }

    /// Runs an introspection query through the transport and installs the
    /// resulting schema on the client.
    pub async fn fetch_schema(&self) -> Result<(), Error> {
        let document = crate::gql(INTROSPECTION_QUERY)?;
        let result = self
            .client
            .transport
            .execute(Request::new(&document))
            .await
            .map_err(Error::Transport)?;
        if let Some(first) = result.first_error() {
            return Err(Error::Server(first.clone()));
        }
        let Some(data) = result.data else {
            return Err(Error::Transport(TransportError::Protocol(
                "introspection returned no data".into(),
            )));
        };
        let schema = Schema::from_introspection(&data)?;
        self.client.install_schema(Arc::new(schema), Some(data));
        Ok(())
    }

    /// Executes a unary operation over the session's connection.
    pub async fn execute(
        &self,
        document: &Document,
        variables: Option<Variables>,
    ) -> Result<serde_json::Value, Error> {
        self.client.execute(document, variables).await
    }

    /// Executes a unary operation described by a full [`Request`].
    pub async fn execute_request(
        &self,
        request: Request<'_>,
    ) -> Result<serde_json::Value, Error> {
        self.client.execute_request(request).await
    }

    /// Starts a subscription over the session's connection.
    pub async fn subscribe(
        &self,
        document: &Document,
        variables: Option<Variables>,
    ) -> Result<DataStream, Error> {
        self.client.subscribe(document, variables).await
    }

    /// Starts a subscription described by a full [`Request`].
    pub async fn subscribe_request(&self, request: Request<'_>) -> Result<DataStream, Error> {
        self.client.subscribe_request(request).await
    }

    /// Closes the connection, terminating outstanding subscriptions.
    pub async fn close(mut self) -> Result<(), Error> {
        self.closed = true;
        self.client.transport.close().await.map_err(Error::Transport)
    }
}

impl<T: SubscriptionTransport + 'static> Drop for Session<'_, T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let transport = Arc::clone(&self.client.transport);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = transport.close().await;
            });
        }
    }
}
