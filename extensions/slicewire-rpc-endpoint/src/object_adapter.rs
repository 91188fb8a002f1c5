use crate::{
    Current, DispatchError, DispatchOutput, EndpointError, IncomingRequest, Servant,
    ServantLocator, ServantMap, WithServants, check_mode,
};
use futures::FutureExt;
use futures::future::join_all;
use slicewire::message::{Message, MessageCodec, MessageStreamDecoder, ProtocolError};
use slicewire::protocol::{
    Encapsulation, ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING, OperationInfo, ReplyFrame, RequestFailed,
    RequestFrame, is_sorted_by_name,
};
use slicewire::slicing::TypeRegistry;
use slicewire::stream::{Identity, StreamConfig, StreamWrite};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

// --- Conditionally Alias the Mutex Implementation ---
#[cfg(not(feature = "tokio_support"))]
use std::sync::Mutex;
#[cfg(feature = "tokio_support")]
use tokio::sync::Mutex;

enum Outcome {
    Output(DispatchOutput),
    Reply(ReplyFrame),
}

/// Routes requests to servants by identity and facet.
///
/// A request is served by the servant registered for its exact identity
/// and facet, else by the default servant of the identity's category (or
/// of the empty category), else by a [`ServantLocator`].
pub struct ObjectAdapter {
    name: String,
    servants: Arc<Mutex<ServantMap>>,
    default_servants: RwLock<HashMap<String, Arc<dyn Servant>>>,
    locators: RwLock<HashMap<String, Arc<dyn ServantLocator>>>,
    deactivated: AtomicBool,
    registry: Arc<TypeRegistry>,
    stream_config: StreamConfig,
}

impl ObjectAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            servants: Arc::new(Mutex::new(HashMap::new())),
            default_servants: RwLock::new(HashMap::new()),
            locators: RwLock::new(HashMap::new()),
            deactivated: AtomicBool::new(false),
            registry: Arc::new(TypeRegistry::new()),
            stream_config: StreamConfig::default(),
        }
    }

    /// Factories used to decode class parameters.
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_stream_config(mut self, stream_config: StreamConfig) -> Self {
        self.stream_config = stream_config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_config(&self) -> StreamConfig {
        self.stream_config
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated.load(Ordering::Acquire)
    }

    fn ensure_active(&self) -> Result<(), EndpointError> {
        if self.is_deactivated() {
            return Err(EndpointError::Deactivated(self.name.clone()));
        }
        Ok(())
    }

    /// Stops serving. Later requests fail, registered servants are
    /// released and every servant locator is told to deactivate. Requests
    /// already dispatching run to completion. Idempotent.
    pub async fn deactivate(&self) {
        if self.deactivated.swap(true, Ordering::AcqRel) {
            return;
        }
        let locators: Vec<_> = self
            .locators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (category, locator) in locators {
            locator.deactivate(&category);
        }
        self.default_servants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.servants.with_servants(|servants| servants.clear()).await;
        tracing::info!(adapter = %self.name, "adapter deactivated");
    }

    pub async fn add(&self, identity: Identity, servant: Arc<dyn Servant>) -> Result<(), EndpointError> {
        self.add_facet(identity, "", servant).await
    }

    pub async fn add_facet(
        &self,
        identity: Identity,
        facet: &str,
        servant: Arc<dyn Servant>,
    ) -> Result<(), EndpointError> {
        self.ensure_active()?;
        check_operations(servant.as_ref())?;
        let facet = facet.to_string();
        self.servants
            .with_servants(move |servants| {
                match servants.entry(identity.clone()).or_default().entry(facet.clone()) {
                    Entry::Occupied(_) => Err(EndpointError::ServantExists { identity, facet }),
                    Entry::Vacant(entry) => {
                        entry.insert(servant);
                        Ok(())
                    }
                }
            })
            .await
    }

    pub async fn remove(&self, identity: &Identity, facet: &str) -> Option<Arc<dyn Servant>> {
        self.servants
            .with_servants(|servants| {
                let facets = servants.get_mut(identity)?;
                let servant = facets.remove(facet);
                if facets.is_empty() {
                    servants.remove(identity);
                }
                servant
            })
            .await
    }

    /// Serves every identity of `category` that has no servant of its own,
    /// whatever the facet. The empty category catches all identities.
    pub fn add_default_servant(
        &self,
        category: &str,
        servant: Arc<dyn Servant>,
    ) -> Result<(), EndpointError> {
        self.ensure_active()?;
        check_operations(servant.as_ref())?;
        let mut defaults = self
            .default_servants
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match defaults.entry(category.to_string()) {
            Entry::Occupied(_) => Err(EndpointError::DefaultServantExists(category.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(servant);
                Ok(())
            }
        }
    }

    pub fn remove_default_servant(&self, category: &str) -> Option<Arc<dyn Servant>> {
        self.default_servants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(category)
    }

    pub fn add_servant_locator(
        &self,
        category: &str,
        locator: Arc<dyn ServantLocator>,
    ) -> Result<(), EndpointError> {
        self.ensure_active()?;
        let mut locators = self.locators.write().unwrap_or_else(PoisonError::into_inner);
        match locators.entry(category.to_string()) {
            Entry::Occupied(_) => Err(EndpointError::LocatorExists(category.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(locator);
                Ok(())
            }
        }
    }

    pub fn remove_servant_locator(&self, category: &str) -> Option<Arc<dyn ServantLocator>> {
        self.locators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(category)
    }

    /// Looks up a registered servant, falling back to the default servant
    /// of the identity's category. A missing identity and a missing facet
    /// of a known identity are distinct failures.
    pub async fn find(
        &self,
        identity: &Identity,
        facet: &str,
    ) -> Result<Arc<dyn Servant>, DispatchError> {
        let found = self
            .servants
            .with_servants(|servants| {
                let facets = servants.get(identity).ok_or(DispatchError::ObjectNotExist)?;
                facets.get(facet).cloned().ok_or(DispatchError::FacetNotExist)
            })
            .await;
        found.or_else(|missing| {
            let defaults = self
                .default_servants
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            defaults
                .get(&identity.category)
                .or_else(|| defaults.get(""))
                .cloned()
                .ok_or(missing)
        })
    }

    /// [`find`](Self::find), then the servant locators. Returns the
    /// locator that supplied the servant, if any.
    async fn servant_for(
        &self,
        current: &Current,
    ) -> Result<(Arc<dyn Servant>, Option<Arc<dyn ServantLocator>>), DispatchError> {
        let missing = match self.find(&current.identity, &current.facet).await {
            Ok(servant) => return Ok((servant, None)),
            Err(missing) => missing,
        };
        let category = current.identity.category.as_str();
        let categories = if category.is_empty() {
            vec![""]
        } else {
            vec![category, ""]
        };
        for category in categories {
            let locator = self
                .locators
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(category)
                .cloned();
            let Some(locator) = locator else {
                continue;
            };
            if let Some(servant) = locator.locate(current).await? {
                tracing::trace!(identity = %current.identity, category, "servant located");
                return Ok((servant, Some(locator)));
            }
        }
        Err(missing)
    }

    /// Decodes incoming bytes and dispatches every complete request,
    /// emitting one reply message per two-way request.
    ///
    /// Malformed messages are logged and skipped. Returns an error when the
    /// connection can no longer be used: the decoder hit a bad message
    /// header, the peer asked to close, or the adapter is deactivated.
    pub async fn read_bytes<E>(
        &self,
        decoder: &mut MessageStreamDecoder,
        bytes: &[u8],
        on_emit: E,
    ) -> Result<(), EndpointError>
    where
        E: Fn(Vec<u8>) + Send + Sync,
    {
        let (requests, status) = self.decode_requests(decoder, bytes);
        let replies = join_all(
            requests
                .into_iter()
                .map(|(request_id, frame)| self.dispatch(request_id, frame)),
        )
        .await;
        for reply in replies.into_iter().flatten() {
            on_emit(reply);
        }
        status
    }

    /// The decoding half of [`read_bytes`](Self::read_bytes): returns the
    /// complete requests (batched ones with request id 0) for the caller
    /// to dispatch, and whether the connection is still usable. Requests
    /// decoded before a fatal message are still returned.
    pub fn decode_requests(
        &self,
        decoder: &mut MessageStreamDecoder,
        bytes: &[u8],
    ) -> (Vec<(i32, RequestFrame)>, Result<(), EndpointError>) {
        if let Err(error) = self.ensure_active() {
            return (Vec::new(), Err(error));
        }
        let mut requests = Vec::new();
        let mut close_requested = false;
        for message in decoder.read_bytes(bytes) {
            match message {
                Ok(Message::Request { request_id, frame }) => requests.push((request_id, frame)),
                Ok(Message::BatchRequest(frames)) => {
                    tracing::debug!(count = frames.len(), "dispatching batch requests");
                    requests.extend(frames.into_iter().map(|frame| (0, frame)));
                }
                Ok(Message::ValidateConnection) => {}
                Ok(Message::CloseConnection) => close_requested = true,
                Ok(Message::Reply { request_id, .. }) => {
                    tracing::warn!(request_id, "ignoring reply sent to a server");
                }
                Err(error) => {
                    tracing::warn!(%error, adapter = %self.name, "discarding malformed message");
                }
            }
        }

        let status = if decoder.is_poisoned() {
            Err(ProtocolError::DecoderPoisoned.into())
        } else if close_requested {
            Err(EndpointError::ClosedByPeer)
        } else {
            Ok(())
        };
        (requests, status)
    }

    /// Dispatches one request and returns the encoded reply message, or
    /// `None` for oneway requests. A deactivated adapter answers every
    /// request as if its object did not exist.
    pub async fn dispatch(&self, request_id: i32, frame: RequestFrame) -> Option<Vec<u8>> {
        let operation = frame.operation.clone();
        let outcome = self.run(request_id, frame).await;
        if request_id == 0 {
            if let Outcome::Reply(reply) = &outcome {
                tracing::debug!(operation = %operation, status = ?reply.status(), "oneway request failed");
            }
            return None;
        }

        let encoded = match outcome {
            Outcome::Output(DispatchOutput::Buffered(results)) => MessageCodec::encode(&Message::Reply {
                request_id,
                reply: ReplyFrame::Ok(results),
            }),
            Outcome::Output(DispatchOutput::Marshaled(write)) => {
                MessageCodec::encode_ok_reply_with(request_id, write)
            }
            Outcome::Reply(reply) => MessageCodec::encode(&Message::Reply { request_id, reply }),
        };
        match encoded {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                tracing::error!(%error, operation = %operation, "failed to marshal reply");
                MessageCodec::encode(&Message::Reply {
                    request_id,
                    reply: ReplyFrame::UnknownLocalException(format!(
                        "failed to marshal the reply of `{operation}`"
                    )),
                })
                .ok()
            }
        }
    }

    async fn run(&self, request_id: i32, frame: RequestFrame) -> Outcome {
        let failed = RequestFailed {
            identity: frame.identity.clone(),
            facet: frame.facet.clone(),
            operation: frame.operation.clone(),
        };

        if self.is_deactivated() {
            tracing::debug!(adapter = %self.name, operation = %failed.operation, "request after deactivation");
            return Outcome::Reply(ReplyFrame::ObjectNotExist(failed));
        }

        let current = Current {
            adapter: self.name.clone(),
            identity: frame.identity,
            facet: frame.facet,
            operation: frame.operation,
            mode: frame.mode,
            context: frame.context,
            request_id,
        };
        let (servant, locator) = match self.servant_for(&current).await {
            Ok(found) => found,
            Err(error) => return Outcome::Reply(error_reply(error, failed, None)),
        };
        let Some(operation) = servant.find_operation(&current.operation).copied() else {
            return Outcome::Reply(ReplyFrame::OperationNotExist(failed));
        };
        if let Err(error) = check_mode(operation.mode, current.mode) {
            return Outcome::Reply(error_reply(error, failed, Some(&operation)));
        }

        let located = locator.map(|locator| (locator, current.clone()));
        let request = IncomingRequest::new(
            current,
            frame.params,
            self.registry.clone(),
            self.stream_config,
        );

        let result = match answer_pseudo_operation(servant.as_ref(), &operation, &request) {
            Some(result) => result,
            None => match AssertUnwindSafe(servant.dispatch(request)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|message| message.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_default();
                    tracing::error!(
                        operation = operation.name,
                        identity = %failed.identity,
                        panic = %message,
                        "servant panicked"
                    );
                    Err(DispatchError::Unknown(format!(
                        "dispatch of `{}` failed",
                        operation.name
                    )))
                }
            },
        };

        if let Some((locator, current)) = located {
            locator.finished(&current, &servant).await;
        }

        match result {
            Ok(output) => Outcome::Output(output),
            Err(error) => Outcome::Reply(error_reply(error, failed, Some(&operation))),
        }
    }
}

fn check_operations(servant: &dyn Servant) -> Result<(), EndpointError> {
    if !is_sorted_by_name(servant.operations()) {
        return Err(EndpointError::UnsortedOperations(
            servant.most_derived_type_id().to_string(),
        ));
    }
    Ok(())
}

fn answer_pseudo_operation(
    servant: &dyn Servant,
    operation: &OperationInfo,
    request: &IncomingRequest,
) -> Option<Result<DispatchOutput, DispatchError>> {
    let result = match operation.name {
        name if name == ICE_PING.name => request
            .read_empty_params()
            .map(|()| DispatchOutput::empty()),
        name if name == ICE_IS_A.name => request
            .read_params(|is| is.read_string())
            .and_then(|type_id| {
                let implements = servant.type_ids().iter().any(|id| *id == type_id);
                Ok(DispatchOutput::buffered(|os| {
                    os.write_bool(implements);
                    Ok(())
                })?)
            }),
        name if name == ICE_ID.name => request.read_empty_params().and_then(|()| {
            let type_id = servant.most_derived_type_id();
            Ok(DispatchOutput::buffered(|os| os.write_string(type_id))?)
        }),
        name if name == ICE_IDS.name => request.read_empty_params().and_then(|()| {
            let mut type_ids: Vec<String> =
                servant.type_ids().iter().map(|id| id.to_string()).collect();
            type_ids.sort();
            Ok(DispatchOutput::buffered(|os| type_ids.write_to(os))?)
        }),
        _ => return None,
    };
    Some(result)
}

/// Maps a dispatch failure onto its reply. User exceptions are marshaled
/// only when `operation` declares them.
fn error_reply(
    error: DispatchError,
    failed: RequestFailed,
    operation: Option<&OperationInfo>,
) -> ReplyFrame {
    match error {
        DispatchError::User(exception) => {
            let declared = operation
                .is_some_and(|operation| operation.declares(exception.exception_type_ids()));
            if !declared {
                return ReplyFrame::UnknownUserException(exception.exception_type_id().to_string());
            }
            match Encapsulation::build(|os| os.write_user_exception(exception.as_ref())) {
                Ok(body) => ReplyFrame::UserException(body),
                Err(error) => {
                    tracing::error!(
                        %error,
                        type_id = exception.exception_type_id(),
                        "failed to marshal user exception"
                    );
                    ReplyFrame::UnknownLocalException(format!(
                        "failed to marshal user exception `{}`",
                        exception.exception_type_id()
                    ))
                }
            }
        }
        DispatchError::ObjectNotExist => ReplyFrame::ObjectNotExist(failed),
        DispatchError::FacetNotExist => ReplyFrame::FacetNotExist(failed),
        DispatchError::OperationNotExist => ReplyFrame::OperationNotExist(failed),
        DispatchError::Marshal(error) => ReplyFrame::UnknownLocalException(error.to_string()),
        DispatchError::Local(message) => ReplyFrame::UnknownLocalException(message),
        DispatchError::Unknown(message) => ReplyFrame::UnknownException(message),
    }
}
