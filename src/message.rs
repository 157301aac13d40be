//! Inbound webhook messages and events.
//!
//! WeChat pushes one XML document per message:
//!
//! ```xml
//! <xml>
//!   <ToUserName><![CDATA[gh_123456789abc]]></ToUserName>
//!   <FromUserName><![CDATA[oUser]]></FromUserName>
//!   <CreateTime>1348831860</CreateTime>
//!   <MsgType><![CDATA[text]]></MsgType>
//!   <Content><![CDATA[hello]]></Content>
//!   <MsgId>1234567890123456</MsgId>
//! </xml>
//! ```
//!
//! Every structure carries the common header (`ToUserName`, `FromUserName`,
//! `CreateTime`, `MsgType`, `MsgId`); events add `Event`. The concrete structure is
//! picked by [`crate::classify`] before the document is decoded.

use std::fmt;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::classify::{self, Classification};
use crate::dispatch::DispatchError;

/// Message type literals
pub const MSG_TYPE_TEXT: &str = "text";
pub const MSG_TYPE_IMAGE: &str = "image";
pub const MSG_TYPE_VOICE: &str = "voice";
pub const MSG_TYPE_VIDEO: &str = "video";
pub const MSG_TYPE_LOCATION: &str = "location";
pub const MSG_TYPE_LINK: &str = "link";
pub const MSG_TYPE_EVENT: &str = "event";

/// Event type literals (case as delivered by WeChat)
pub const EVENT_CLICK: &str = "CLICK";
pub const EVENT_VIEW: &str = "VIEW";
pub const EVENT_LOCATION: &str = "LOCATION";
pub const EVENT_SCAN: &str = "SCAN";
pub const EVENT_SUBSCRIBE: &str = "subscribe";
pub const EVENT_UNSUBSCRIBE: &str = "unsubscribe";

/// Concrete kind of an inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    Location,
    Link,
    ClickEvent,
    ViewEvent,
    LocationEvent,
    ScanEvent,
    SubscribeEvent,
    UnsubscribeEvent,
}

impl MessageKind {
    pub const ALL: [MessageKind; 12] = [
        MessageKind::Text,
        MessageKind::Image,
        MessageKind::Voice,
        MessageKind::Video,
        MessageKind::Location,
        MessageKind::Link,
        MessageKind::ClickEvent,
        MessageKind::ViewEvent,
        MessageKind::LocationEvent,
        MessageKind::ScanEvent,
        MessageKind::SubscribeEvent,
        MessageKind::UnsubscribeEvent,
    ];

    /// Map a classifier result onto a kind.
    pub fn resolve(c: &Classification) -> Result<Self, DispatchError> {
        let kind = match c.msg_type.as_str() {
            MSG_TYPE_TEXT => MessageKind::Text,
            MSG_TYPE_IMAGE => MessageKind::Image,
            MSG_TYPE_VOICE => MessageKind::Voice,
            MSG_TYPE_VIDEO => MessageKind::Video,
            MSG_TYPE_LOCATION => MessageKind::Location,
            MSG_TYPE_LINK => MessageKind::Link,
            MSG_TYPE_EVENT => {
                let event = c.event.as_deref().unwrap_or_default();
                match event {
                    EVENT_CLICK => MessageKind::ClickEvent,
                    EVENT_VIEW => MessageKind::ViewEvent,
                    EVENT_LOCATION => MessageKind::LocationEvent,
                    EVENT_SCAN => MessageKind::ScanEvent,
                    EVENT_SUBSCRIBE => MessageKind::SubscribeEvent,
                    EVENT_UNSUBSCRIBE => MessageKind::UnsubscribeEvent,
                    other => return Err(DispatchError::InvalidEventType(other.to_string())),
                }
            }
            other => return Err(DispatchError::InvalidMessageType(other.to_string())),
        };
        Ok(kind)
    }

    /// `MsgType` literal
    pub fn msg_type(self) -> &'static str {
        match self {
            MessageKind::Text => MSG_TYPE_TEXT,
            MessageKind::Image => MSG_TYPE_IMAGE,
            MessageKind::Voice => MSG_TYPE_VOICE,
            MessageKind::Video => MSG_TYPE_VIDEO,
            MessageKind::Location => MSG_TYPE_LOCATION,
            MessageKind::Link => MSG_TYPE_LINK,
            _ => MSG_TYPE_EVENT,
        }
    }

    /// `Event` literal for event kinds
    pub fn event_type(self) -> Option<&'static str> {
        match self {
            MessageKind::ClickEvent => Some(EVENT_CLICK),
            MessageKind::ViewEvent => Some(EVENT_VIEW),
            MessageKind::LocationEvent => Some(EVENT_LOCATION),
            MessageKind::ScanEvent => Some(EVENT_SCAN),
            MessageKind::SubscribeEvent => Some(EVENT_SUBSCRIBE),
            MessageKind::UnsubscribeEvent => Some(EVENT_UNSUBSCRIBE),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event_type() {
            Some(event) => write!(f, "event/{event}"),
            None => f.write_str(self.msg_type()),
        }
    }
}

/// Borrowed view of the header every payload carries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageHeader<'a> {
    pub to_user_name: &'a str,
    pub from_user_name: &'a str,
    pub create_time: i64,
    pub msg_type: &'a str,
    pub msg_id: Option<i64>,
    /// `Event` for event payloads
    pub event: Option<&'a str>,
}

/// A typed inbound structure bound to exactly one [`MessageKind`].
pub trait InboundPayload: DeserializeOwned + Send + 'static {
    const KIND: MessageKind;

    fn header(&self) -> MessageHeader<'_>;
}

/// Decode a whole document into a known structure.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, DispatchError> {
    Ok(quick_xml::de::from_reader(raw)?)
}

/// Text message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextMessage {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    #[serde(default)]
    pub msg_id: Option<i64>,
    pub content: String,
}

/// Image message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageMessage {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    #[serde(default)]
    pub msg_id: Option<i64>,
    pub pic_url: String,
    /// Temporary media id; fetch the file with the media API
    pub media_id: String,
}

/// Voice message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceMessage {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    #[serde(default)]
    pub msg_id: Option<i64>,
    pub media_id: String,
    /// amr, speex, ...
    pub format: String,
    /// Speech recognition result, when enabled for the account
    #[serde(default)]
    pub recognition: Option<String>,
}

/// Video message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VideoMessage {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    #[serde(default)]
    pub msg_id: Option<i64>,
    pub media_id: String,
    pub thumb_media_id: String,
}

/// Location message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationMessage {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    #[serde(default)]
    pub msg_id: Option<i64>,
    /// Latitude
    #[serde(rename = "Location_X")]
    pub location_x: f64,
    /// Longitude
    #[serde(rename = "Location_Y")]
    pub location_y: f64,
    pub scale: i32,
    pub label: String,
}

/// Link message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinkMessage {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    #[serde(default)]
    pub msg_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub url: String,
}

/// Custom menu click (`CLICK`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClickEvent {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    pub event: String,
    /// Matches the `key` of the clicked menu button
    pub event_key: String,
}

/// Menu link opened (`VIEW`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewEvent {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    pub event: String,
    /// Target URL
    pub event_key: String,
    #[serde(default)]
    pub menu_id: Option<String>,
}

/// Periodic location report (`LOCATION`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationEvent {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    pub event: String,
    pub latitude: f64,
    pub longitude: f64,
    pub precision: f64,
}

/// QR code scanned by a user who already follows the account (`SCAN`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanEvent {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    pub event: String,
    /// scene_id / scene_str of the QR code
    pub event_key: String,
    pub ticket: String,
}

/// Follow (`subscribe`); QR follows carry `qrscene_`-prefixed `EventKey` and a `Ticket`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscribeEvent {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    pub event: String,
    #[serde(default)]
    pub event_key: Option<String>,
    #[serde(default)]
    pub ticket: Option<String>,
}

/// Unfollow (`unsubscribe`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnsubscribeEvent {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    pub event: String,
    #[serde(default)]
    pub event_key: Option<String>,
    #[serde(default)]
    pub ticket: Option<String>,
}

macro_rules! message_payload {
    ($($ty:ident => $kind:ident),* $(,)?) => {$(
        impl InboundPayload for $ty {
            const KIND: MessageKind = MessageKind::$kind;

            fn header(&self) -> MessageHeader<'_> {
                MessageHeader {
                    to_user_name: &self.to_user_name,
                    from_user_name: &self.from_user_name,
                    create_time: self.create_time,
                    msg_type: &self.msg_type,
                    msg_id: self.msg_id,
                    event: None,
                }
            }
        }
    )*};
}

macro_rules! event_payload {
    ($($ty:ident => $kind:ident),* $(,)?) => {$(
        impl InboundPayload for $ty {
            const KIND: MessageKind = MessageKind::$kind;

            fn header(&self) -> MessageHeader<'_> {
                MessageHeader {
                    to_user_name: &self.to_user_name,
                    from_user_name: &self.from_user_name,
                    create_time: self.create_time,
                    msg_type: &self.msg_type,
                    msg_id: None,
                    event: Some(&self.event),
                }
            }
        }
    )*};
}

message_payload! {
    TextMessage => Text,
    ImageMessage => Image,
    VoiceMessage => Voice,
    VideoMessage => Video,
    LocationMessage => Location,
    LinkMessage => Link,
}

event_payload! {
    ClickEvent => ClickEvent,
    ViewEvent => ViewEvent,
    LocationEvent => LocationEvent,
    ScanEvent => ScanEvent,
    SubscribeEvent => SubscribeEvent,
    UnsubscribeEvent => UnsubscribeEvent,
}

/// Event payloads
#[derive(Debug, Clone, PartialEq)]
pub enum EventMessage {
    Click(ClickEvent),
    View(ViewEvent),
    Location(LocationEvent),
    Scan(ScanEvent),
    Subscribe(SubscribeEvent),
    Unsubscribe(UnsubscribeEvent),
}

/// Any inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Text(TextMessage),
    Image(ImageMessage),
    Voice(VoiceMessage),
    Video(VideoMessage),
    Location(LocationMessage),
    Link(LinkMessage),
    Event(EventMessage),
}

impl InboundMessage {
    /// Classify and decode a raw document without going through a handler registry.
    pub fn from_xml(raw: &[u8]) -> Result<Self, DispatchError> {
        let kind = MessageKind::resolve(&classify::classify(raw)?)?;
        Self::decode_as(kind, raw)
    }

    /// Decode `raw` as the structure bound to `kind`.
    pub fn decode_as(kind: MessageKind, raw: &[u8]) -> Result<Self, DispatchError> {
        let msg = match kind {
            MessageKind::Text => InboundMessage::Text(decode(raw)?),
            MessageKind::Image => InboundMessage::Image(decode(raw)?),
            MessageKind::Voice => InboundMessage::Voice(decode(raw)?),
            MessageKind::Video => InboundMessage::Video(decode(raw)?),
            MessageKind::Location => InboundMessage::Location(decode(raw)?),
            MessageKind::Link => InboundMessage::Link(decode(raw)?),
            MessageKind::ClickEvent => InboundMessage::Event(EventMessage::Click(decode(raw)?)),
            MessageKind::ViewEvent => InboundMessage::Event(EventMessage::View(decode(raw)?)),
            MessageKind::LocationEvent => {
                InboundMessage::Event(EventMessage::Location(decode(raw)?))
            }
            MessageKind::ScanEvent => InboundMessage::Event(EventMessage::Scan(decode(raw)?)),
            MessageKind::SubscribeEvent => {
                InboundMessage::Event(EventMessage::Subscribe(decode(raw)?))
            }
            MessageKind::UnsubscribeEvent => {
                InboundMessage::Event(EventMessage::Unsubscribe(decode(raw)?))
            }
        };
        Ok(msg)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMessage::Text(_) => MessageKind::Text,
            InboundMessage::Image(_) => MessageKind::Image,
            InboundMessage::Voice(_) => MessageKind::Voice,
            InboundMessage::Video(_) => MessageKind::Video,
            InboundMessage::Location(_) => MessageKind::Location,
            InboundMessage::Link(_) => MessageKind::Link,
            InboundMessage::Event(EventMessage::Click(_)) => MessageKind::ClickEvent,
            InboundMessage::Event(EventMessage::View(_)) => MessageKind::ViewEvent,
            InboundMessage::Event(EventMessage::Location(_)) => MessageKind::LocationEvent,
            InboundMessage::Event(EventMessage::Scan(_)) => MessageKind::ScanEvent,
            InboundMessage::Event(EventMessage::Subscribe(_)) => MessageKind::SubscribeEvent,
            InboundMessage::Event(EventMessage::Unsubscribe(_)) => MessageKind::UnsubscribeEvent,
        }
    }

    pub fn header(&self) -> MessageHeader<'_> {
        match self {
            InboundMessage::Text(m) => m.header(),
            InboundMessage::Image(m) => m.header(),
            InboundMessage::Voice(m) => m.header(),
            InboundMessage::Video(m) => m.header(),
            InboundMessage::Location(m) => m.header(),
            InboundMessage::Link(m) => m.header(),
            InboundMessage::Event(EventMessage::Click(m)) => m.header(),
            InboundMessage::Event(EventMessage::View(m)) => m.header(),
            InboundMessage::Event(EventMessage::Location(m)) => m.header(),
            InboundMessage::Event(EventMessage::Scan(m)) => m.header(),
            InboundMessage::Event(EventMessage::Subscribe(m)) => m.header(),
            InboundMessage::Event(EventMessage::Unsubscribe(m)) => m.header(),
        }
    }
}
