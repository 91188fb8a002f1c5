use crate::{
    ClientConnection, InvocationConfig, InvocationError, InvocationHandle, InvocationKind,
    RetryPolicy,
};
use slicewire::protocol::{
    Encapsulation, ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING, OperationInfo, OperationMode, ReplyFrame,
    RequestFrame,
};
use slicewire::slicing::{DecodedUserException, TypeRegistry};
use slicewire::stream::{
    Context, Identity, InputStream, OutputStream, ProxyRef, StreamConfig, StreamError, StreamRead,
};
use std::sync::Arc;
use std::time::Duration;

/// Successful outcome of an untyped invocation: either the results or a
/// user exception, both still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationReply {
    Ok(Encapsulation),
    UserException(Encapsulation),
}

impl InvocationReply {
    fn from_frame(reply: ReplyFrame) -> Result<Self, InvocationError> {
        match reply {
            ReplyFrame::Ok(results) => Ok(InvocationReply::Ok(results)),
            ReplyFrame::UserException(body) => Ok(InvocationReply::UserException(body)),
            ReplyFrame::ObjectNotExist(failed) => Err(InvocationError::ObjectNotExist(failed)),
            ReplyFrame::FacetNotExist(failed) => Err(InvocationError::FacetNotExist(failed)),
            ReplyFrame::OperationNotExist(failed) => {
                Err(InvocationError::OperationNotExist(failed))
            }
            ReplyFrame::UnknownLocalException(message) => {
                Err(InvocationError::UnknownLocalException(message))
            }
            ReplyFrame::UnknownUserException(message) => {
                Err(InvocationError::UnknownUserException(message))
            }
            ReplyFrame::UnknownException(message) => Err(InvocationError::UnknownException(message)),
        }
    }
}

/// A reference to a remote object, bound to one or more connections
/// (replicas of the same object).
///
/// Proxies are cheap to clone; the `with_*` methods return modified copies.
#[derive(Clone)]
pub struct Proxy {
    identity: Identity,
    facet: String,
    context: Context,
    replicas: Vec<Arc<ClientConnection>>,
    config: InvocationConfig,
    registry: Arc<TypeRegistry>,
    stream_config: StreamConfig,
}

impl Proxy {
    pub fn new(identity: Identity, connection: Arc<ClientConnection>) -> Self {
        Self::with_replicas(identity, vec![connection])
    }

    /// Retries move on to the next replica in order.
    pub fn with_replicas(identity: Identity, replicas: Vec<Arc<ClientConnection>>) -> Self {
        Self {
            identity,
            facet: String::new(),
            context: Context::new(),
            replicas,
            config: InvocationConfig::default(),
            registry: Arc::new(TypeRegistry::new()),
            stream_config: StreamConfig::default(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn facet(&self) -> &str {
        &self.facet
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &InvocationConfig {
        &self.config
    }

    pub fn replicas(&self) -> &[Arc<ClientConnection>] {
        &self.replicas
    }

    pub fn with_facet(&self, facet: impl Into<String>) -> Self {
        let mut proxy = self.clone();
        proxy.facet = facet.into();
        proxy
    }

    /// Context sent with every invocation that does not supply its own.
    pub fn with_context(&self, context: Context) -> Self {
        let mut proxy = self.clone();
        proxy.context = context;
        proxy
    }

    pub fn with_config(&self, config: InvocationConfig) -> Self {
        let mut proxy = self.clone();
        proxy.config = config;
        proxy
    }

    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        self.with_config(self.config.clone().with_timeout(timeout))
    }

    pub fn with_retry_policy(&self, retry_policy: RetryPolicy) -> Self {
        self.with_config(self.config.clone().with_retry_policy(retry_policy))
    }

    pub fn with_registry(&self, registry: Arc<TypeRegistry>) -> Self {
        let mut proxy = self.clone();
        proxy.registry = registry;
        proxy
    }

    pub fn with_stream_config(&self, stream_config: StreamConfig) -> Self {
        let mut proxy = self.clone();
        proxy.stream_config = stream_config;
        proxy
    }

    pub fn twoway(&self) -> Self {
        self.with_config(self.config.clone().with_invocation_kind(InvocationKind::TwoWay))
    }

    pub fn oneway(&self) -> Self {
        self.with_config(self.config.clone().with_invocation_kind(InvocationKind::Oneway))
    }

    pub fn batch_oneway(&self) -> Self {
        self.with_config(
            self.config
                .clone()
                .with_invocation_kind(InvocationKind::BatchOneway),
        )
    }

    /// Marshaled form of this proxy.
    pub fn to_proxy_ref(&self) -> ProxyRef {
        let endpoints = self
            .replicas
            .iter()
            .map(|connection| connection.endpoint().to_string())
            .filter(|endpoint| !endpoint.is_empty())
            .collect();
        let mut proxy = ProxyRef::new(self.identity.clone(), endpoints);
        proxy.facet = self.facet.clone();
        proxy.invocation_mode = self.config.invocation_kind.as_wire_mode();
        proxy
    }

    /// Sends already-marshaled parameters and resolves to the encoded
    /// reply. System-level reply statuses resolve to the matching
    /// [`InvocationError`].
    ///
    /// Oneway and batch invocations resolve to an empty `Ok` reply once the
    /// request has been handed off.
    pub fn invoke(
        &self,
        operation: &str,
        mode: OperationMode,
        params: Encapsulation,
        context: Option<&Context>,
    ) -> InvocationHandle<InvocationReply> {
        let frame = RequestFrame::new(self.identity.clone(), operation, mode, params)
            .with_facet(self.facet.clone())
            .with_context(context.unwrap_or(&self.context).clone());
        let proxy = self.clone();
        InvocationHandle::new(async move { proxy.run(frame).await })
    }

    /// Typed invocation: marshals parameters with `write_params`, then
    /// decodes the results with `read_result` or the user exception against
    /// the operation's throws clause.
    ///
    /// An exception the operation does not declare (or one no registered
    /// type matches) surfaces as [`InvocationError::UnknownUserException`]
    /// carrying its type id.
    pub fn invoke_operation<T, W, R>(
        &self,
        operation: &'static OperationInfo,
        write_params: W,
        read_result: R,
    ) -> InvocationHandle<T>
    where
        T: Send + 'static,
        W: FnOnce(&mut OutputStream) -> Result<(), StreamError>,
        R: FnOnce(&mut InputStream<'_>) -> Result<T, StreamError> + Send + 'static,
    {
        let params = match Encapsulation::build(write_params) {
            Ok(params) => params,
            Err(error) => return InvocationHandle::ready(Err(InvocationError::Marshal(error))),
        };
        let registry = self.registry.clone();
        let stream_config = self.stream_config;
        self.invoke(operation.name, operation.mode, params, None)
            .and_then(move |reply| {
                decode_reply(operation, reply, &registry, stream_config, read_result)
            })
    }

    /// Sends the batch queued on every replica.
    pub async fn flush_batch(&self) -> Result<(), InvocationError> {
        for connection in &self.replicas {
            connection.flush_batch().await?;
        }
        Ok(())
    }

    pub async fn ice_ping(&self) -> Result<(), InvocationError> {
        self.invoke_operation(&ICE_PING, |_| Ok(()), |_| Ok(())).await
    }

    pub async fn ice_is_a(&self, type_id: &str) -> Result<bool, InvocationError> {
        self.invoke_operation(&ICE_IS_A, |os| os.write_string(type_id), |is| is.read_bool())
            .await
    }

    pub async fn ice_id(&self) -> Result<String, InvocationError> {
        self.invoke_operation(&ICE_ID, |_| Ok(()), |is| is.read_string())
            .await
    }

    pub async fn ice_ids(&self) -> Result<Vec<String>, InvocationError> {
        self.invoke_operation(&ICE_IDS, |_| Ok(()), Vec::<String>::read_from)
            .await
    }

    async fn run(self, frame: RequestFrame) -> Result<InvocationReply, InvocationError> {
        if self.replicas.is_empty() {
            return Err(InvocationError::NoConnections);
        }
        let policy = &self.config.retry_policy;
        let mut attempts = 0;
        let mut retries = 0;
        let mut replica = 0;
        loop {
            let connection = &self.replicas[replica % self.replicas.len()];
            attempts += 1;
            let error = match self.attempt(connection, frame.clone()).await {
                Ok(ReplyFrame::ObjectNotExist(failed)) if replica + 1 < self.replicas.len() => {
                    tracing::warn!(
                        identity = %failed.identity,
                        endpoint = connection.endpoint(),
                        "object not found on replica, trying the next one"
                    );
                    replica += 1;
                    continue;
                }
                Ok(reply) => return InvocationReply::from_frame(reply),
                Err(error) => error,
            };

            if !policy.allows(&error, frame.mode) {
                return Err(error);
            }
            let Some(delay) = policy.delay_for(retries) else {
                return Err(InvocationError::ConnectionFailed {
                    attempts,
                    reason: error.to_string(),
                });
            };
            retries += 1;
            tracing::warn!(
                operation = %frame.operation,
                attempts,
                ?delay,
                %error,
                "retrying invocation"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            replica += 1;
        }
    }

    async fn attempt(
        &self,
        connection: &ClientConnection,
        frame: RequestFrame,
    ) -> Result<ReplyFrame, InvocationError> {
        match self.config.invocation_kind {
            InvocationKind::TwoWay => {
                let pending = connection.send_request(frame).await?;
                pending.wait(self.config.timeout).await
            }
            InvocationKind::Oneway => {
                connection.send_oneway(frame).await?;
                Ok(ReplyFrame::Ok(Encapsulation::empty()))
            }
            InvocationKind::BatchOneway => {
                connection.queue_batch(frame).await?;
                Ok(ReplyFrame::Ok(Encapsulation::empty()))
            }
        }
    }
}

fn decode_reply<T, R>(
    operation: &OperationInfo,
    reply: InvocationReply,
    registry: &TypeRegistry,
    stream_config: StreamConfig,
    read_result: R,
) -> Result<T, InvocationError>
where
    R: FnOnce(&mut InputStream<'_>) -> Result<T, StreamError>,
{
    match reply {
        InvocationReply::Ok(results) => {
            // Results without class instances need no factories.
            let registry = operation.uses_classes.then_some(registry);
            results
                .decode(registry, stream_config, read_result)
                .map_err(InvocationError::Decode)
        }
        InvocationReply::UserException(body) => {
            let decoded = body
                .decode(Some(registry), stream_config, |is| is.read_user_exception())
                .map_err(InvocationError::Decode)?;
            Err(match decoded {
                DecodedUserException::Known { exception, .. }
                    if operation.declares(exception.exception_type_ids()) =>
                {
                    InvocationError::UserException(exception)
                }
                other => {
                    tracing::debug!(
                        type_id = other.type_id(),
                        operation = operation.name,
                        "user exception not declared by the operation"
                    );
                    InvocationError::UnknownUserException(other.type_id().to_string())
                }
            })
        }
    }
}
