use slicewire::message::{Message, MessageCodec, MessageStreamDecoder, ProtocolError};
use slicewire::protocol::{
    Encapsulation, ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING, OperationInfo, OperationMode, ReplyFrame,
    ReplyStatus, RequestFrame,
};
use slicewire::slicing::{DecodedUserException, ExceptionType, SliceDescriptor, TypeRegistry};
use slicewire::stream::{Identity, StreamConfig, StreamRead};
use slicewire_rpc_endpoint::{
    Current, DispatchError, DispatchInterceptor, DispatchOutput, EndpointError, IncomingRequest,
    InterceptedServant, ObjectAdapter, Servant, ServantLocator,
};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct CalcError {
    reason: String,
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "calc error: {}", self.reason)
    }
}

impl ExceptionType for CalcError {
    const SLICES: &'static [SliceDescriptor<Self>] = &[SliceDescriptor {
        type_id: "::Test::CalcError",
        compact_id: None,
        write_members: |e, os| os.write_string(&e.reason),
        read_members: |e, is| {
            e.reason = is.read_string()?;
            Ok(())
        },
    }];
}

#[derive(Debug, Default)]
struct SecretError;

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("secret error")
    }
}

impl ExceptionType for SecretError {
    const SLICES: &'static [SliceDescriptor<Self>] = &[SliceDescriptor {
        type_id: "::Test::SecretError",
        compact_id: None,
        write_members: |_, _| Ok(()),
        read_members: |_, _| Ok(()),
    }];
}

const ADD: OperationInfo = OperationInfo::new("add", OperationMode::Idempotent);
const FAIL: OperationInfo =
    OperationInfo::new("fail", OperationMode::Normal).with_throws(&["::Test::CalcError"]);
const LEAK: OperationInfo =
    OperationInfo::new("leak", OperationMode::Normal).with_throws(&["::Test::CalcError"]);
const PANIC: OperationInfo = OperationInfo::new("panic", OperationMode::Normal);
const SQUARE: OperationInfo = OperationInfo::new("square", OperationMode::Normal);

const CALCULATOR_OPERATIONS: [OperationInfo; 9] =
    [ADD, FAIL, ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING, LEAK, PANIC, SQUARE];

#[derive(Default)]
struct Calculator {
    dispatched: AtomicUsize,
}

#[async_trait::async_trait]
impl Servant for Calculator {
    fn type_ids(&self) -> &[&'static str] {
        &["::Test::Calculator", "::Slicewire::Object"]
    }

    fn operations(&self) -> &[OperationInfo] {
        &CALCULATOR_OPERATIONS
    }

    async fn dispatch(&self, request: IncomingRequest) -> Result<DispatchOutput, DispatchError> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        match request.current.operation.as_str() {
            "add" => {
                let (a, b) = request.read_params(|is| Ok((is.read_int()?, is.read_int()?)))?;
                Ok(DispatchOutput::buffered(|os| {
                    os.write_int(a + b);
                    Ok(())
                })?)
            }
            "square" => {
                let value = request.read_params(|is| is.read_int())?;
                Ok(DispatchOutput::marshaled(move |os| {
                    os.write_int(value * value);
                    Ok(())
                }))
            }
            "fail" => {
                let reason = request.read_params(|is| is.read_string())?;
                Err(DispatchError::user(CalcError { reason }))
            }
            "leak" => {
                request.read_empty_params()?;
                Err(DispatchError::user(SecretError))
            }
            "panic" => panic!("database password is hunter2"),
            _ => Err(DispatchError::OperationNotExist),
        }
    }
}

fn int_params(values: &[i32]) -> Encapsulation {
    Encapsulation::build(|os| {
        values.iter().for_each(|value| os.write_int(*value));
        Ok(())
    })
    .unwrap()
}

fn frame(identity: &str, operation: &str, mode: OperationMode, params: Encapsulation) -> RequestFrame {
    RequestFrame::new(Identity::new(identity), operation, mode, params)
}

async fn adapter_with_calculator() -> (ObjectAdapter, Arc<Calculator>) {
    let adapter = ObjectAdapter::new("test");
    let calculator = Arc::new(Calculator::default());
    adapter
        .add(Identity::new("calc"), calculator.clone())
        .await
        .unwrap();
    (adapter, calculator)
}

async fn call(adapter: &ObjectAdapter, frame: RequestFrame) -> ReplyFrame {
    let bytes = adapter.dispatch(5, frame).await.expect("two-way reply");
    match MessageCodec::decode(&bytes).unwrap() {
        Message::Reply { request_id: 5, reply } => reply,
        other => panic!("unexpected message {other:?}"),
    }
}

fn read_int(reply: &ReplyFrame) -> i32 {
    match reply {
        ReplyFrame::Ok(results) => results
            .decode(None, StreamConfig::default(), |is| is.read_int())
            .unwrap(),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn dispatches_to_the_servant() {
    let (adapter, _) = adapter_with_calculator().await;
    let reply = call(
        &adapter,
        frame("calc", "add", OperationMode::Idempotent, int_params(&[2, 40])),
    )
    .await;
    assert_eq!(read_int(&reply), 42);
}

#[tokio::test]
async fn in_place_results_match_buffered_results() {
    let (adapter, _) = adapter_with_calculator().await;
    let reply = adapter
        .dispatch(9, frame("calc", "square", OperationMode::Normal, int_params(&[7])))
        .await
        .unwrap();
    let expected = MessageCodec::encode(&Message::Reply {
        request_id: 9,
        reply: ReplyFrame::Ok(int_params(&[49])),
    })
    .unwrap();
    assert_eq!(reply, expected);
}

#[tokio::test]
async fn missing_object_facet_and_operation_are_distinct() {
    let (adapter, _) = adapter_with_calculator().await;

    let reply = call(&adapter, frame("nobody", "add", OperationMode::Idempotent, int_params(&[1, 2]))).await;
    assert_eq!(reply.status(), ReplyStatus::ObjectNotExist);

    let reply = call(
        &adapter,
        frame("calc", "add", OperationMode::Idempotent, int_params(&[1, 2])).with_facet("admin"),
    )
    .await;
    match reply {
        ReplyFrame::FacetNotExist(failed) => {
            assert_eq!(failed.facet, "admin");
            assert_eq!(failed.operation, "add");
        }
        other => panic!("unexpected reply {other:?}"),
    }

    let reply = call(&adapter, frame("calc", "divide", OperationMode::Normal, Encapsulation::empty())).await;
    assert_eq!(reply.status(), ReplyStatus::OperationNotExist);
}

#[tokio::test]
async fn mode_mismatch_fails_before_the_servant_runs() {
    let (adapter, calculator) = adapter_with_calculator().await;
    let reply = call(&adapter, frame("calc", "square", OperationMode::Idempotent, int_params(&[3]))).await;
    assert_eq!(reply.status(), ReplyStatus::UnknownLocalException);
    assert_eq!(calculator.dispatched.load(Ordering::SeqCst), 0);

    // Legacy callers may still send Nonmutating for idempotent operations.
    let reply = call(&adapter, frame("calc", "add", OperationMode::Nonmutating, int_params(&[1, 1]))).await;
    assert_eq!(read_int(&reply), 2);
}

#[tokio::test]
async fn declared_user_exceptions_keep_their_type() {
    let (adapter, _) = adapter_with_calculator().await;
    let params = Encapsulation::build(|os| os.write_string("overflow")).unwrap();
    let reply = call(&adapter, frame("calc", "fail", OperationMode::Normal, params)).await;

    let ReplyFrame::UserException(body) = reply else {
        panic!("expected a user exception");
    };
    let mut registry = TypeRegistry::new();
    registry.register_exception::<CalcError>();
    let decoded = body
        .decode(Some(&registry), StreamConfig::default(), |is| is.read_user_exception())
        .unwrap();
    match decoded {
        DecodedUserException::Known { exception, .. } => {
            let error = exception.downcast_ref::<CalcError>().unwrap();
            assert_eq!(error.reason, "overflow");
        }
        other => panic!("unexpected exception {other:?}"),
    }
}

#[tokio::test]
async fn undeclared_user_exceptions_only_send_their_type_id() {
    let (adapter, _) = adapter_with_calculator().await;
    let reply = call(&adapter, frame("calc", "leak", OperationMode::Normal, Encapsulation::empty())).await;
    assert_eq!(
        reply,
        ReplyFrame::UnknownUserException("::Test::SecretError".into())
    );
}

#[tokio::test]
async fn servant_panics_do_not_leak_details() {
    let (adapter, _) = adapter_with_calculator().await;
    let reply = call(&adapter, frame("calc", "panic", OperationMode::Normal, Encapsulation::empty())).await;
    match reply {
        ReplyFrame::UnknownException(message) => {
            assert!(!message.contains("hunter2"));
            assert!(message.contains("panic"));
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn pseudo_operations_are_answered_from_the_type_ids() {
    let (adapter, calculator) = adapter_with_calculator().await;

    let reply = call(&adapter, frame("calc", "ice_ping", OperationMode::Idempotent, Encapsulation::empty())).await;
    assert_eq!(reply, ReplyFrame::Ok(Encapsulation::empty()));

    let params = Encapsulation::build(|os| os.write_string("::Slicewire::Object")).unwrap();
    let reply = call(&adapter, frame("calc", "ice_isA", OperationMode::Idempotent, params)).await;
    let ReplyFrame::Ok(results) = reply else { panic!("expected results") };
    assert!(results.decode(None, StreamConfig::default(), |is| is.read_bool()).unwrap());

    let reply = call(&adapter, frame("calc", "ice_id", OperationMode::Idempotent, Encapsulation::empty())).await;
    let ReplyFrame::Ok(results) = reply else { panic!("expected results") };
    let type_id = results.decode(None, StreamConfig::default(), |is| is.read_string()).unwrap();
    assert_eq!(type_id, "::Test::Calculator");

    let reply = call(&adapter, frame("calc", "ice_ids", OperationMode::Idempotent, Encapsulation::empty())).await;
    let ReplyFrame::Ok(results) = reply else { panic!("expected results") };
    let type_ids = results
        .decode(None, StreamConfig::default(), Vec::<String>::read_from)
        .unwrap();
    assert_eq!(type_ids, vec!["::Slicewire::Object", "::Test::Calculator"]);

    assert_eq!(calculator.dispatched.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn registration_rejects_duplicates_and_unsorted_tables() {
    let (adapter, calculator) = adapter_with_calculator().await;
    assert!(matches!(
        adapter.add(Identity::new("calc"), calculator.clone()).await,
        Err(EndpointError::ServantExists { .. })
    ));
    adapter
        .add_facet(Identity::new("calc"), "admin", calculator)
        .await
        .unwrap();
    assert!(adapter.find(&Identity::new("calc"), "admin").await.is_ok());
    assert!(adapter.remove(&Identity::new("calc"), "admin").await.is_some());
    assert!(matches!(
        adapter.find(&Identity::new("calc"), "admin").await,
        Err(DispatchError::FacetNotExist)
    ));

    struct Unsorted;

    #[async_trait::async_trait]
    impl Servant for Unsorted {
        fn type_ids(&self) -> &[&'static str] {
            &["::Test::Unsorted"]
        }

        fn operations(&self) -> &[OperationInfo] {
            &[ICE_PING, ICE_ID]
        }

        async fn dispatch(&self, _request: IncomingRequest) -> Result<DispatchOutput, DispatchError> {
            Err(DispatchError::OperationNotExist)
        }
    }

    assert!(matches!(
        adapter.add(Identity::new("unsorted"), Arc::new(Unsorted)).await,
        Err(EndpointError::UnsortedOperations(_))
    ));
}

struct AuditInterceptor {
    seen: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl DispatchInterceptor for AuditInterceptor {
    async fn intercept(
        &self,
        request: IncomingRequest,
        next: &dyn Servant,
    ) -> Result<DispatchOutput, DispatchError> {
        self.seen
            .lock()
            .unwrap()
            .push(request.current.operation.clone());
        if request.current.context.contains_key("deny") {
            return Err(DispatchError::Local("denied".into()));
        }
        next.dispatch(request).await
    }
}

#[tokio::test]
async fn interceptors_see_requests_before_the_servant() {
    let adapter = ObjectAdapter::new("intercepted");
    let calculator = Arc::new(Calculator::default());
    let interceptor = Arc::new(AuditInterceptor {
        seen: Mutex::new(Vec::new()),
    });
    adapter
        .add(
            Identity::new("calc"),
            Arc::new(InterceptedServant::new(calculator.clone(), interceptor.clone())),
        )
        .await
        .unwrap();

    let reply = call(&adapter, frame("calc", "add", OperationMode::Idempotent, int_params(&[3, 4]))).await;
    assert_eq!(read_int(&reply), 7);

    let mut context = slicewire::stream::Context::new();
    context.insert("deny".into(), String::new());
    let reply = call(
        &adapter,
        frame("calc", "add", OperationMode::Idempotent, int_params(&[3, 4])).with_context(context),
    )
    .await;
    assert_eq!(reply, ReplyFrame::UnknownLocalException("denied".into()));

    assert_eq!(*interceptor.seen.lock().unwrap(), vec!["add", "add"]);
    assert_eq!(calculator.dispatched.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn read_bytes_replies_to_two_way_requests_only() {
    let (adapter, calculator) = adapter_with_calculator().await;
    let mut input = MessageCodec::encode(&Message::Request {
        request_id: 1,
        frame: frame("calc", "add", OperationMode::Idempotent, int_params(&[1, 2])),
    })
    .unwrap();
    input.extend(
        MessageCodec::encode(&Message::Request {
            request_id: 0,
            frame: frame("calc", "add", OperationMode::Idempotent, int_params(&[5, 5])),
        })
        .unwrap(),
    );
    input.extend(
        MessageCodec::encode(&Message::BatchRequest(vec![
            frame("calc", "add", OperationMode::Idempotent, int_params(&[0, 0])),
            frame("calc", "square", OperationMode::Normal, int_params(&[2])),
        ]))
        .unwrap(),
    );

    let emitted = Mutex::new(Vec::new());
    let mut decoder = MessageStreamDecoder::new();
    // Feed the stream in uneven pieces.
    for chunk in input.chunks(13) {
        adapter
            .read_bytes(&mut decoder, chunk, |bytes| emitted.lock().unwrap().push(bytes))
            .await
            .unwrap();
    }

    let emitted = emitted.into_inner().unwrap();
    assert_eq!(emitted.len(), 1);
    match MessageCodec::decode(&emitted[0]).unwrap() {
        Message::Reply { request_id, reply } => {
            assert_eq!(request_id, 1);
            assert_eq!(read_int(&reply), 3);
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert_eq!(calculator.dispatched.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn read_bytes_reports_unusable_connections() {
    let (adapter, _) = adapter_with_calculator().await;

    let mut decoder = MessageStreamDecoder::new();
    let close = MessageCodec::encode(&Message::CloseConnection).unwrap();
    assert!(matches!(
        adapter.read_bytes(&mut decoder, &close, |_| {}).await,
        Err(EndpointError::ClosedByPeer)
    ));

    let mut decoder = MessageStreamDecoder::new();
    let garbage = [b'X'; 20];
    assert!(matches!(
        adapter.read_bytes(&mut decoder, &garbage, |_| {}).await,
        Err(EndpointError::Protocol(ProtocolError::DecoderPoisoned))
    ));
}

/// Hands out one calculator for every identity in its category except
/// `declined` and `forbidden`, and records what it was asked for.
struct CalculatorLocator {
    declined: &'static str,
    calculator: Arc<Calculator>,
    located: Mutex<Vec<String>>,
    finished: AtomicUsize,
    deactivated: Mutex<Vec<String>>,
}

impl CalculatorLocator {
    fn new(declined: &'static str) -> Self {
        Self {
            declined,
            calculator: Arc::new(Calculator::default()),
            located: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
            deactivated: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ServantLocator for CalculatorLocator {
    async fn locate(&self, current: &Current) -> Result<Option<Arc<dyn Servant>>, DispatchError> {
        self.located.lock().unwrap().push(current.identity.to_string());
        let name = current.identity.name.as_str();
        if name == self.declined {
            return Ok(None);
        }
        if name == "forbidden" {
            return Err(DispatchError::Local("access denied".into()));
        }
        let servant: Arc<dyn Servant> = self.calculator.clone();
        Ok(Some(servant))
    }

    async fn finished(&self, _current: &Current, _servant: &Arc<dyn Servant>) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn deactivate(&self, category: &str) {
        self.deactivated.lock().unwrap().push(category.to_string());
    }
}

fn categorized(category: &str, name: &str, operation: &str, params: Encapsulation) -> RequestFrame {
    let mut identity = Identity::new(name);
    identity.category = category.to_string();
    RequestFrame::new(identity, operation, OperationMode::Idempotent, params)
}

#[tokio::test]
async fn locators_serve_identities_without_a_registered_servant() {
    let (adapter, registered) = adapter_with_calculator().await;
    let by_category = Arc::new(CalculatorLocator::new("missing"));
    let fallback = Arc::new(CalculatorLocator::new("nothing"));
    adapter.add_servant_locator("calc", by_category.clone()).unwrap();
    adapter.add_servant_locator("", fallback.clone()).unwrap();
    assert!(matches!(
        adapter.add_servant_locator("calc", fallback.clone()),
        Err(EndpointError::LocatorExists(_))
    ));

    // Registered servants win over locators.
    let reply = call(&adapter, frame("calc", "add", OperationMode::Idempotent, int_params(&[1, 1]))).await;
    assert_eq!(read_int(&reply), 2);
    assert_eq!(registered.dispatched.load(Ordering::SeqCst), 1);
    assert!(by_category.located.lock().unwrap().is_empty());

    let reply = call(&adapter, categorized("calc", "any", "add", int_params(&[2, 3]))).await;
    assert_eq!(read_int(&reply), 5);
    assert_eq!(by_category.calculator.dispatched.load(Ordering::SeqCst), 1);
    assert_eq!(by_category.finished.load(Ordering::SeqCst), 1);

    // A category locator with nothing to offer falls through to the default one.
    let reply = call(&adapter, categorized("calc", "missing", "add", int_params(&[4, 4]))).await;
    assert_eq!(read_int(&reply), 8);
    assert_eq!(fallback.calculator.dispatched.load(Ordering::SeqCst), 1);

    let reply = call(&adapter, categorized("other", "nothing", "add", int_params(&[1, 2]))).await;
    assert_eq!(reply.status(), ReplyStatus::ObjectNotExist);

    let reply = call(&adapter, categorized("calc", "forbidden", "add", int_params(&[1, 2]))).await;
    assert_eq!(
        reply,
        ReplyFrame::UnknownLocalException("access denied".into())
    );
    assert_eq!(by_category.finished.load(Ordering::SeqCst), 1);

    assert!(adapter.remove_servant_locator("").is_some());
    let reply = call(&adapter, categorized("other", "any", "add", int_params(&[1, 2]))).await;
    assert_eq!(reply.status(), ReplyStatus::ObjectNotExist);
}

#[tokio::test]
async fn default_servants_answer_for_their_category() {
    let (adapter, registered) = adapter_with_calculator().await;
    let by_category = Arc::new(Calculator::default());
    let catch_all = Arc::new(Calculator::default());
    adapter.add_default_servant("calc", by_category.clone()).unwrap();
    assert!(matches!(
        adapter.add_default_servant("calc", catch_all.clone()),
        Err(EndpointError::DefaultServantExists(_))
    ));

    let reply = call(&adapter, categorized("calc", "any", "add", int_params(&[1, 2]))).await;
    assert_eq!(read_int(&reply), 3);
    let reply = call(&adapter, categorized("other", "any", "add", int_params(&[1, 2]))).await;
    assert_eq!(reply.status(), ReplyStatus::ObjectNotExist);

    adapter.add_default_servant("", catch_all.clone()).unwrap();
    // A missing facet of a registered identity also reaches the default servant.
    let reply = call(
        &adapter,
        frame("calc", "add", OperationMode::Idempotent, int_params(&[2, 2])).with_facet("admin"),
    )
    .await;
    assert_eq!(read_int(&reply), 4);
    let reply = call(&adapter, categorized("other", "any", "add", int_params(&[1, 2]))).await;
    assert_eq!(read_int(&reply), 3);

    assert_eq!(registered.dispatched.load(Ordering::SeqCst), 0);
    assert_eq!(by_category.dispatched.load(Ordering::SeqCst), 1);
    assert_eq!(catch_all.dispatched.load(Ordering::SeqCst), 2);
    assert!(adapter.remove_default_servant("calc").is_some());
}

#[tokio::test]
async fn deactivated_adapters_reject_requests() {
    let (adapter, calculator) = adapter_with_calculator().await;
    let locator = Arc::new(CalculatorLocator::new("nothing"));
    adapter.add_servant_locator("calc", locator.clone()).unwrap();
    assert!(!adapter.is_deactivated());

    adapter.deactivate().await;
    adapter.deactivate().await;
    assert!(adapter.is_deactivated());
    assert_eq!(*locator.deactivated.lock().unwrap(), vec!["calc".to_string()]);

    let reply = call(&adapter, frame("calc", "add", OperationMode::Idempotent, int_params(&[1, 2]))).await;
    assert_eq!(reply.status(), ReplyStatus::ObjectNotExist);
    assert_eq!(calculator.dispatched.load(Ordering::SeqCst), 0);

    let request = MessageCodec::encode(&Message::Request {
        request_id: 1,
        frame: frame("calc", "add", OperationMode::Idempotent, int_params(&[1, 2])),
    })
    .unwrap();
    let mut decoder = MessageStreamDecoder::new();
    let emitted = Mutex::new(Vec::new());
    assert!(matches!(
        adapter
            .read_bytes(&mut decoder, &request, |bytes| emitted.lock().unwrap().push(bytes))
            .await,
        Err(EndpointError::Deactivated(name)) if name == "test"
    ));
    assert!(emitted.into_inner().unwrap().is_empty());

    assert!(matches!(
        adapter.add(Identity::new("late"), Arc::new(Calculator::default())).await,
        Err(EndpointError::Deactivated(_))
    ));
    assert!(adapter.find(&Identity::new("calc"), "").await.is_err());
}
