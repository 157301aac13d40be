//! Inbound message dispatch.
//!
//! A raw webhook body goes through three steps:
//! 1. [`crate::classify::classify`] finds `MsgType` (and `Event`) with a forward scan.
//! 2. The registered handler for that [`MessageKind`] is looked up.
//! 3. The body is decoded once into the handler's structure and the handler runs.
//!
//! ```ignore
//! use wxapi_rs::{HandlerRegistry, MessageDispatcher, SubscribeEvent, TextMessage};
//!
//! let registry = HandlerRegistry::new()
//!     .on(|msg: TextMessage| async move {
//!         tracing::info!(from = %msg.from_user_name, "text: {}", msg.content);
//!         anyhow::Ok(())
//!     })
//!     .on(|ev: SubscribeEvent| async move {
//!         tracing::info!(scene = ?ev.event_key, "new follower");
//!         anyhow::Ok(())
//!     });
//!
//! let dispatcher = MessageDispatcher::new(registry);
//! dispatcher.dispatch(body.as_ref()).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::classify;
use crate::message::{self, InboundPayload, MessageKind};

/// Errors from classifying, decoding or handling an inbound message
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("document has no <{0}> element")]
    MissingField(&'static str),

    #[error("failed to decode message body: {0}")]
    Decode(#[from] quick_xml::DeError),

    #[error("invalid message type: {0:?}")]
    InvalidMessageType(String),

    #[error("invalid event type: {0:?}")]
    InvalidEventType(String),

    #[error("no handler registered for {0}")]
    UnregisteredHandler(MessageKind),

    #[error("{kind} handler failed: {error}")]
    Handler {
        kind: MessageKind,
        #[source]
        error: anyhow::Error,
    },
}

/// Callback for one inbound structure.
///
/// Implemented for any `Fn(M) -> impl Future<Output = anyhow::Result<()>>`.
#[async_trait]
pub trait Handler<M: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, message: M) -> anyhow::Result<()>;
}

#[async_trait]
impl<M, F, Fut> Handler<M> for F
where
    M: Send + 'static,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: M) -> anyhow::Result<()> {
        (self)(message).await
    }
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call(&self, raw: &[u8]) -> Result<(), DispatchError>;
}

struct Typed<M, H> {
    handler: H,
    _message: PhantomData<fn(M)>,
}

#[async_trait]
impl<M, H> ErasedHandler for Typed<M, H>
where
    M: InboundPayload,
    H: Handler<M>,
{
    async fn call(&self, raw: &[u8]) -> Result<(), DispatchError> {
        let message: M = message::decode(raw)?;
        self.handler
            .handle(message)
            .await
            .map_err(|error| DispatchError::Handler {
                kind: M::KIND,
                error,
            })
    }
}

/// One handler per [`MessageKind`], configured at startup
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageKind, Box<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `M::KIND`, replacing any previous one.
    pub fn register<M, H>(&mut self, handler: H) -> &mut Self
    where
        M: InboundPayload,
        H: Handler<M>,
    {
        let typed = Typed::<M, H> {
            handler,
            _message: PhantomData,
        };
        if self.handlers.insert(M::KIND, Box::new(typed)).is_some() {
            warn!(kind = %M::KIND, "replaced previously registered handler");
        }
        self
    }

    pub fn with_handler<M, H>(mut self, handler: H) -> Self
    where
        M: InboundPayload,
        H: Handler<M>,
    {
        self.register::<M, H>(handler);
        self
    }

    /// Register a closure; the structure is inferred from its argument type.
    pub fn on<M, F, Fut>(self, f: F) -> Self
    where
        M: InboundPayload,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_handler::<M, F>(f)
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Classifies raw bodies and routes them to the registry
#[derive(Clone, Debug)]
pub struct MessageDispatcher {
    registry: Arc<HandlerRegistry>,
}

impl MessageDispatcher {
    pub fn new(registry: impl Into<Arc<HandlerRegistry>>) -> Self {
        Self {
            registry: registry.into(),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Classify `raw`, decode it once and run the matching handler.
    ///
    /// The handler's result is returned as-is, wrapped in [`DispatchError::Handler`] on failure.
    #[instrument(level = "debug", skip_all, fields(len = raw.len()))]
    pub async fn dispatch(&self, raw: &[u8]) -> Result<(), DispatchError> {
        let classification = classify::classify(raw)?;
        let kind = MessageKind::resolve(&classification)?;
        let handler = self
            .registry
            .handlers
            .get(&kind)
            .ok_or(DispatchError::UnregisteredHandler(kind))?;
        debug!(%kind, "dispatching inbound message");
        handler.call(raw).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::message::{ClickEvent, SubscribeEvent, TextMessage};

    const SUBSCRIBE: &str = r#"<xml>
  <ToUserName><![CDATA[gh_123456789abc]]></ToUserName>
  <FromUserName><![CDATA[oFollower]]></FromUserName>
  <CreateTime>1700000000</CreateTime>
  <MsgType><![CDATA[event]]></MsgType>
  <Event><![CDATA[subscribe]]></Event>
  <EventKey><![CDATA[qrscene_123123]]></EventKey>
  <Ticket><![CDATA[TICKET]]></Ticket>
</xml>"#;

    const TEXT: &str = r#"<xml>
  <ToUserName><![CDATA[gh_123456789abc]]></ToUserName>
  <FromUserName><![CDATA[oUser]]></FromUserName>
  <CreateTime>1348831860</CreateTime>
  <MsgType><![CDATA[text]]></MsgType>
  <Content><![CDATA[this is a test]]></Content>
  <MsgId>1234567890123456</MsgId>
</xml>"#;

    #[tokio::test]
    async fn subscribe_event_reaches_its_handler() {
        let seen: Arc<Mutex<Option<SubscribeEvent>>> = Arc::default();
        let sink = seen.clone();
        let registry = HandlerRegistry::new().on(move |ev: SubscribeEvent| {
            let sink = sink.clone();
            async move {
                *sink.lock() = Some(ev);
                anyhow::Ok(())
            }
        });

        let c = classify::classify(SUBSCRIBE.as_bytes()).expect("classify");
        assert_eq!(c.msg_type, "event");
        assert_eq!(c.event.as_deref(), Some("subscribe"));

        MessageDispatcher::new(registry)
            .dispatch(SUBSCRIBE.as_bytes())
            .await
            .expect("dispatch");

        let ev = seen.lock().take().expect("handler ran");
        assert_eq!(ev.event_key.as_deref(), Some("qrscene_123123"));
        assert_eq!(ev.ticket.as_deref(), Some("TICKET"));
        assert_eq!(ev.from_user_name, "oFollower");
        assert_eq!(ev.create_time, 1700000000);
    }

    #[tokio::test]
    async fn unregistered_kind_is_not_an_invalid_kind() {
        let registry = HandlerRegistry::new().on(|_: SubscribeEvent| async { anyhow::Ok(()) });
        let err = MessageDispatcher::new(registry)
            .dispatch(TEXT.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnregisteredHandler(MessageKind::Text)));
    }

    #[tokio::test]
    async fn unknown_msg_type_carries_literal() {
        let xml = "<xml><MsgType><![CDATA[bogus]]></MsgType></xml>";
        let err = MessageDispatcher::new(HandlerRegistry::new())
            .dispatch(xml.as_bytes())
            .await
            .unwrap_err();
        match err {
            DispatchError::InvalidMessageType(t) => assert_eq!(t, "bogus"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_event_type_carries_literal() {
        let xml = "<xml><MsgType>event</MsgType><Event>MASSSENDJOBFINISH</Event></xml>";
        let err = MessageDispatcher::new(HandlerRegistry::new())
            .dispatch(xml.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidEventType(t) if t == "MASSSENDJOBFINISH"));
    }

    #[tokio::test]
    async fn same_document_decodes_identically() {
        let seen: Arc<Mutex<Vec<TextMessage>>> = Arc::default();
        let sink = seen.clone();
        let dispatcher = MessageDispatcher::new(HandlerRegistry::new().on(move |msg: TextMessage| {
            let sink = sink.clone();
            async move {
                sink.lock().push(msg);
                anyhow::Ok(())
            }
        }));

        dispatcher.dispatch(TEXT.as_bytes()).await.expect("first");
        dispatcher.dispatch(TEXT.as_bytes()).await.expect("second");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0].content, "this is a test");
        assert_eq!(seen[0].msg_id, Some(1234567890123456));
    }

    #[tokio::test]
    async fn missing_msg_type_is_reported() {
        let err = MessageDispatcher::new(HandlerRegistry::new())
            .dispatch(b"<xml><Content>x</Content></xml>")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingField("MsgType")));
    }

    #[tokio::test]
    async fn handler_error_is_propagated_with_kind() {
        let registry = HandlerRegistry::new()
            .on(|_: TextMessage| async { Err::<(), _>(anyhow::anyhow!("downstream unavailable")) });
        let err = MessageDispatcher::new(registry)
            .dispatch(TEXT.as_bytes())
            .await
            .unwrap_err();
        match err {
            DispatchError::Handler { kind, error } => {
                assert_eq!(kind, MessageKind::Text);
                assert_eq!(error.to_string(), "downstream unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_that_does_not_fit_the_kind_fails_to_decode() {
        // CLICK events require EventKey
        let xml = "<xml><ToUserName>a</ToUserName><FromUserName>b</FromUserName><CreateTime>1</CreateTime><MsgType>event</MsgType><Event>CLICK</Event></xml>";
        let registry = HandlerRegistry::new().on(|_: ClickEvent| async { anyhow::Ok(()) });
        let err = MessageDispatcher::new(registry)
            .dispatch(xml.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Decode(_)));
    }

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler<ClickEvent> for CountingHandler {
        async fn handle(&self, ev: ClickEvent) -> anyhow::Result<()> {
            assert_eq!(ev.event_key, "V1001_TODAY_MUSIC");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn trait_handlers_register_and_replace() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register::<ClickEvent, _>(|_: ClickEvent| async { anyhow::Ok(()) });
        registry.register::<ClickEvent, _>(CountingHandler {
            calls: calls.clone(),
        });
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(MessageKind::ClickEvent));
        assert!(!registry.contains(MessageKind::ViewEvent));

        let xml = "<xml><ToUserName>a</ToUserName><FromUserName>b</FromUserName><CreateTime>1</CreateTime><MsgType>event</MsgType><Event>CLICK</Event><EventKey>V1001_TODAY_MUSIC</EventKey></xml>";
        MessageDispatcher::new(registry)
            .dispatch(xml.as_bytes())
            .await
            .expect("dispatch");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
