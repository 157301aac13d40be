use std::sync::Arc;

use parking_lot::Mutex;
use wxapi_rs::signature::sha1_signature;
use wxapi_rs::{
    ClickEvent, DispatchError, EventMessage, HandlerRegistry, InboundMessage, MessageDispatcher,
    MessageKind, ScanEvent, SignatureQuery, TextMessage, VoiceMessage, classify,
    verify_url_signature,
};

const TOKEN: &str = "callback_token";

fn signed_query(timestamp: &str, nonce: &str) -> SignatureQuery {
    SignatureQuery {
        signature: Some(sha1_signature(&[TOKEN, timestamp, nonce])),
        timestamp: Some(timestamp.to_string()),
        nonce: Some(nonce.to_string()),
        echostr: Some("5837397520665436492".to_string()),
        openid: None,
    }
}

#[test]
fn url_verification_handshake() {
    let q = signed_query("1700000000", "1514711492");
    assert_eq!(q.echo(TOKEN).expect("echo"), "5837397520665436492");
    assert!(q.echo("wrong").is_err());
    assert!(verify_url_signature(
        TOKEN,
        "1700000000",
        "1514711492",
        q.signature.as_deref().unwrap_or_default()
    ));
}

#[tokio::test]
async fn routes_messages_and_events_by_kind() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();

    let (a, b, c) = (log.clone(), log.clone(), log.clone());
    let registry = HandlerRegistry::new()
        .on(move |m: TextMessage| {
            let log = a.clone();
            async move {
                log.lock().push(format!("text:{}", m.content));
                anyhow::Ok(())
            }
        })
        .on(move |ev: ClickEvent| {
            let log = b.clone();
            async move {
                log.lock().push(format!("click:{}", ev.event_key));
                anyhow::Ok(())
            }
        })
        .on(move |ev: ScanEvent| {
            let log = c.clone();
            async move {
                log.lock().push(format!("scan:{}:{}", ev.event_key, ev.ticket));
                anyhow::Ok(())
            }
        });
    let dispatcher = MessageDispatcher::new(registry);

    let text = r#"<xml><ToUserName><![CDATA[gh_1]]></ToUserName><FromUserName><![CDATA[oU]]></FromUserName><CreateTime>1348831860</CreateTime><MsgType><![CDATA[text]]></MsgType><Content><![CDATA[你好]]></Content><MsgId>1</MsgId></xml>"#;
    let click = r#"<xml><ToUserName><![CDATA[gh_1]]></ToUserName><FromUserName><![CDATA[oU]]></FromUserName><CreateTime>123456789</CreateTime><MsgType><![CDATA[event]]></MsgType><Event><![CDATA[CLICK]]></Event><EventKey><![CDATA[V1001_TODAY_MUSIC]]></EventKey></xml>"#;
    let scan = r#"<xml><ToUserName><![CDATA[gh_1]]></ToUserName><FromUserName><![CDATA[oU]]></FromUserName><CreateTime>123456789</CreateTime><MsgType><![CDATA[event]]></MsgType><Event><![CDATA[SCAN]]></Event><EventKey><![CDATA[123123]]></EventKey><Ticket><![CDATA[TICKET]]></Ticket></xml>"#;

    for body in [text, click, scan] {
        dispatcher.dispatch(body.as_bytes()).await.expect("dispatch");
    }
    assert_eq!(
        *log.lock(),
        vec!["text:你好", "click:V1001_TODAY_MUSIC", "scan:123123:TICKET"]
    );

    let voice = r#"<xml><ToUserName>gh_1</ToUserName><FromUserName>oU</FromUserName><CreateTime>1</CreateTime><MsgType>voice</MsgType><MediaId>m</MediaId><Format>amr</Format><MsgId>2</MsgId></xml>"#;
    let err = dispatcher.dispatch(voice.as_bytes()).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::UnregisteredHandler(MessageKind::Voice)
    ));
}

#[test]
fn decode_without_registry() {
    let voice = r#"<xml>
  <ToUserName><![CDATA[toUser]]></ToUserName>
  <FromUserName><![CDATA[fromUser]]></FromUserName>
  <CreateTime>1357290913</CreateTime>
  <MsgType><![CDATA[voice]]></MsgType>
  <MediaId><![CDATA[media_id]]></MediaId>
  <Format><![CDATA[amr]]></Format>
  <Recognition><![CDATA[腾讯微信团队]]></Recognition>
  <MsgId>1234567890123456</MsgId>
</xml>"#;
    let c = classify(voice.as_bytes()).expect("classify");
    assert_eq!(c.msg_type, "voice");

    match InboundMessage::from_xml(voice.as_bytes()).expect("decode") {
        InboundMessage::Voice(VoiceMessage {
            format,
            recognition,
            ..
        }) => {
            assert_eq!(format, "amr");
            assert_eq!(recognition.as_deref(), Some("腾讯微信团队"));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    let unsubscribe = "<xml><ToUserName>a</ToUserName><FromUserName>b</FromUserName><CreateTime>1</CreateTime><MsgType>event</MsgType><Event>unsubscribe</Event></xml>";
    assert!(matches!(
        InboundMessage::from_xml(unsubscribe.as_bytes()),
        Ok(InboundMessage::Event(EventMessage::Unsubscribe(_)))
    ));
}
