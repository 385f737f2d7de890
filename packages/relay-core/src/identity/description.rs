//! Streaming extraction of identity fields from a UPnP device description.
//!
//! Only the text of three exact element paths is captured while the document
//! streams past. Embedded devices under `deviceList` have deeper paths and are
//! ignored, so they can never override the root device.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tokio::io::AsyncBufRead;

use crate::protocol_constants::{DEVICE_TYPE_PATH, FRIENDLY_NAME_PATH, UDN_PATH};

/// Identity fields found in a description document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionFields {
    pub uuid: Option<String>,
    pub device_type: Option<String>,
    pub friendly_name: Option<String>,
}

impl DescriptionFields {
    /// Returns whether a non-empty UDN was found.
    #[must_use]
    pub fn has_uuid(&self) -> bool {
        self.uuid.as_deref().is_some_and(|u| !u.is_empty())
    }

    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Uuid => &mut self.uuid,
            Field::DeviceType => &mut self.device_type,
            Field::FriendlyName => &mut self.friendly_name,
        };
        *slot = Some(value);
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Uuid,
    DeviceType,
    FriendlyName,
}

impl Field {
    fn for_path(path: &str) -> Option<Self> {
        match path {
            UDN_PATH => Some(Self::Uuid),
            DEVICE_TYPE_PATH => Some(Self::DeviceType),
            FRIENDLY_NAME_PATH => Some(Self::FriendlyName),
            _ => None,
        }
    }
}

/// Element currently being captured.
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

/// Parses a description document from `source`, reading it incrementally.
///
/// Namespace prefixes are ignored when matching paths. If a path occurs more
/// than once, the last occurrence wins.
pub async fn parse_description<R>(source: R) -> Result<DescriptionFields, quick_xml::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut capture: Option<Capture> = None;
    let mut fields = DescriptionFields::default();

    loop {
        match reader.read_event_into_async(&mut buf).await? {
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                if capture.is_none() {
                    capture = Field::for_path(&path.join("/")).map(|field| Capture {
                        field,
                        depth: path.len(),
                        text: String::new(),
                    });
                }
            }
            Event::End(_) => {
                if capture.as_ref().is_some_and(|c| c.depth == path.len()) {
                    if let Some(c) = capture.take() {
                        fields.set(c.field, c.text.trim().to_string());
                    }
                }
                path.pop();
            }
            Event::Text(e) => {
                if let Some(c) = capture.as_mut().filter(|c| c.depth == path.len()) {
                    c.text.push_str(&e.decode()?);
                }
            }
            Event::CData(e) => {
                if let Some(c) = capture.as_mut().filter(|c| c.depth == path.len()) {
                    c.text.push_str(&e.decode()?);
                }
            }
            Event::GeneralRef(e) => {
                if let Some(c) = capture.as_mut().filter(|c| c.depth == path.len()) {
                    if let Some(ch) = e.resolve_char_ref()? {
                        c.text.push(ch);
                    } else {
                        let name = e.decode()?;
                        match resolve_predefined_entity(&name) {
                            Some(value) => c.text.push_str(value),
                            None => {
                                c.text.push('&');
                                c.text.push_str(&name);
                                c.text.push(';');
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(fields)
}
