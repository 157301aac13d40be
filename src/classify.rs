//! Forward-only scan that finds `MsgType` (and `Event` for event messages)
//! without decoding the rest of the document.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader;

use crate::dispatch::DispatchError;
use crate::message::MSG_TYPE_EVENT;

const MSG_TYPE_TAG: &[u8] = b"MsgType";
const EVENT_TAG: &[u8] = b"Event";

/// Kind strings found in a document. `event` is only set when `msg_type == "event"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub msg_type: String,
    pub event: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    MessageType,
    EventType,
}

impl Phase {
    fn tag(self) -> &'static [u8] {
        match self {
            Phase::MessageType => MSG_TYPE_TAG,
            Phase::EventType => EVENT_TAG,
        }
    }

    fn field(self) -> &'static str {
        match self {
            Phase::MessageType => "MsgType",
            Phase::EventType => "Event",
        }
    }
}

/// Identify the message kind of `raw`.
///
/// Both phases share one reader; scanning stops at the first match, so trailing
/// fields are never tokenized. Event literals are returned as written
/// (`subscribe` is lower case, `CLICK` upper case).
pub fn classify(raw: &[u8]) -> Result<Classification, DispatchError> {
    let mut reader = Reader::from_reader(raw);
    let mut buf = Vec::new();

    let msg_type = scan_for(&mut reader, &mut buf, Phase::MessageType)?;
    if msg_type != MSG_TYPE_EVENT {
        return Ok(Classification {
            msg_type,
            event: None,
        });
    }

    let event = scan_for(&mut reader, &mut buf, Phase::EventType)?;
    Ok(Classification {
        msg_type,
        event: Some(event),
    })
}

/// Advance until the phase's start tag, then read its value.
fn scan_for(
    reader: &mut Reader<&[u8]>,
    buf: &mut Vec<u8>,
    phase: Phase,
) -> Result<String, DispatchError> {
    loop {
        buf.clear();
        let at_value = match reader.read_event_into(buf)? {
            XmlEvent::Start(e) => e.local_name().as_ref() == phase.tag(),
            // `<MsgType/>` carries no value
            XmlEvent::Empty(e) if e.local_name().as_ref() == phase.tag() => {
                return Ok(String::new());
            }
            XmlEvent::Eof => return Err(DispatchError::MissingField(phase.field())),
            _ => false,
        };
        if at_value {
            return next_char_data(reader, buf);
        }
    }
}

/// Collect the character data of the element just opened, up to its end tag.
///
/// Text and CDATA fragments are joined, entity and character references are
/// resolved. A nested element means the value is not plain text.
fn next_char_data(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<String, DispatchError> {
    let mut text = String::new();
    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            XmlEvent::Text(t) => text.push_str(&t.decode().map_err(quick_xml::Error::from)?),
            XmlEvent::CData(c) => text.push_str(&c.decode().map_err(quick_xml::Error::from)?),
            XmlEvent::GeneralRef(r) => match r.resolve_char_ref()? {
                Some(ch) => text.push(ch),
                None => {
                    let name = r.decode().map_err(quick_xml::Error::from)?;
                    match resolve_predefined_entity(&name) {
                        Some(value) => text.push_str(value),
                        // unknown entities are kept verbatim
                        None => {
                            text.push('&');
                            text.push_str(&name);
                            text.push(';');
                        }
                    }
                }
            },
            XmlEvent::Start(_) | XmlEvent::Empty(_) => return Ok(String::new()),
            XmlEvent::End(_) | XmlEvent::Eof => break,
            _ => {}
        }
    }
    Ok(text.trim().to_string())
}
