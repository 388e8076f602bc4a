#![warn(missing_docs)]
//! Outlook MSG decoder
//!
//! Decodes the property streams of MS-Outlook MSG files into semantic
//! property maps and exposes a message level view over them: summary and
//! transport headers, bodies, recipients and attachments (including embedded
//! messages)
//!
//! The main interface is [`Message`]
//!
//! # Examples
//! ```no_run
//! use msgdecode_rs::{Diagnostics, Message, DecoderOptions, PropertyDecoder};
//! use msgdecode_rs::ole::Ole;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let ole = Ole::new(BufReader::new(File::open("message.msg").unwrap())).unwrap();
//! let decoder = PropertyDecoder::new(&ole, DecoderOptions::default());
//! let mut diag = Diagnostics::new();
//! let msg = Message::load(&decoder, &mut diag).unwrap();
//! for (k, v) in msg.summary_headers() {
//!     println!("{k}: {v}");
//! }
//! ```
pub mod container;
pub mod diag;
pub mod io;
pub mod ole;
pub mod props;

pub use container::{Container, ContainerEntry};
pub use diag::{DecodeEvent, Diagnostics};
pub use props::codepage::Charset;
pub use props::{
    DecodedValue, DecoderOptions, EmbeddedRef, PropertyDecoder, PropertySet, StreamKind,
};

use container::{ATTACHMENT_PREFIX, RECIPIENT_PREFIX};
use props::codepage::{FALLBACK_ENCODING, charset_for_codepage};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

fn has_prefix(name: &str, prefix: &str) -> bool {
    name.get(0..prefix.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(prefix))
}

/// A decoded message (top level or embedded)
#[derive(Debug)]
pub struct Message<E> {
    /// Nesting depth (0 for the top level message)
    pub depth: usize,
    /// Message properties
    pub properties: PropertySet<E>,
    /// Message recipients, ordered by storage name
    pub recipients: Vec<Recipient<E>>,
    /// Message attachments, ordered by storage name
    pub attachments: Vec<Attachment<E>>,
}

impl<E: ContainerEntry> Message<E> {
    /// Loads the top level message
    ///
    /// # Errors
    /// Fails if the container cannot be listed or if the message property
    /// stream is missing or unreadable. Problems with recipients, attachments
    /// and individual properties are recorded into `diag` instead
    pub fn load<C: Container<Entry = E>>(
        decoder: &PropertyDecoder<'_, C>,
        diag: &mut Diagnostics,
    ) -> Result<Self, std::io::Error> {
        let root = decoder.container().root();
        Self::load_node(decoder, &root, StreamKind::TopLevel, 0, diag)?.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Top level message not decoded",
            )
        })
    }

    /// Loads an embedded message
    ///
    /// Returns `Ok(None)` if the message is nested too deep
    pub fn load_embedded<C: Container<Entry = E>>(
        decoder: &PropertyDecoder<'_, C>,
        emb: &EmbeddedRef<E>,
        diag: &mut Diagnostics,
    ) -> Result<Option<Self>, std::io::Error> {
        Self::load_node(decoder, &emb.entry, StreamKind::Nested, emb.depth, diag)
    }

    fn load_node<C: Container<Entry = E>>(
        decoder: &PropertyDecoder<'_, C>,
        node: &E,
        kind: StreamKind,
        depth: usize,
        diag: &mut Diagnostics,
    ) -> Result<Option<Self>, std::io::Error> {
        let Some(properties) = decoder.decode(node, kind, depth, diag)? else {
            return Ok(None);
        };
        let mut children = decoder.container().children(node)?;
        children.sort_by(|a, b| a.name().cmp(b.name()));
        let mut recipients = Vec::new();
        let mut attachments = Vec::new();
        for child in children.iter().filter(|c| c.is_storage()) {
            let name = child.name();
            let res = if has_prefix(name, RECIPIENT_PREFIX) {
                Recipient::load(decoder, child, depth + 1, diag)
                    .map(|r| r.map(|r| recipients.push(r)))
            } else if has_prefix(name, ATTACHMENT_PREFIX) {
                Attachment::load(decoder, child, depth + 1, diag)
                    .map(|a| a.map(|a| attachments.push(a)))
            } else {
                continue;
            };
            if let Err(e) = res {
                diag.record(DecodeEvent::SubobjectFailed {
                    name: name.to_string(),
                    error: e.to_string(),
                });
            }
        }
        if let Some(hdr) = properties.header() {
            if hdr.recipient_count as usize != recipients.len()
                || hdr.attachment_count as usize != attachments.len()
            {
                debug!(
                    "Header lists {} recipients and {} attachments, found {} and {}",
                    hdr.recipient_count,
                    hdr.attachment_count,
                    recipients.len(),
                    attachments.len()
                );
            }
        }
        Ok(Some(Self {
            depth,
            properties,
            recipients,
            attachments,
        }))
    }

    /// Returns the charset of the message body
    ///
    /// This is the internet code page if set and supported, otherwise the
    /// message code page, otherwise the legacy fallback
    pub fn body_encoding(&self) -> Charset {
        ["PR_INTERNET_CPID", "PR_MESSAGE_CODEPAGE"]
            .into_iter()
            .filter_map(|k| self.properties.as_int(k))
            .filter_map(|cp| u32::try_from(cp).ok().and_then(charset_for_codepage))
            .next()
            .unwrap_or(Charset::from(FALLBACK_ENCODING))
    }

    /// Returns the delivery time
    pub fn date(&self) -> Option<time::OffsetDateTime> {
        self.properties.as_time("MESSAGE_DELIVERY_TIME")
    }

    /// Returns the delivery time formatted as in RFC 2822
    pub fn date_header(&self) -> Option<String> {
        self.date()?
            .format(&time::format_description::well_known::Rfc2822)
            .ok()
    }

    /// Returns the message subject
    pub fn subject(&self) -> Option<&str> {
        self.properties.as_str("SUBJECT")
    }

    /// Returns the sender name
    ///
    /// If the message was sent on behalf of someone else, the represented
    /// name follows in parentheses
    pub fn sender(&self) -> Option<String> {
        let sender = self.properties.as_str("SENDER_NAME")?;
        match self.properties.as_str("SENT_REPRESENTING_NAME") {
            Some(repr) if !repr.is_empty() && repr != sender => {
                Some(format!("{sender} ({repr})"))
            }
            _ => Some(sender.to_string()),
        }
    }

    /// Returns the sender e-mail address
    pub fn sender_email(&self) -> Option<&str> {
        ["SENDER_SMTP_ADDRESS", "SENDER_EMAIL_ADDRESS"]
            .into_iter()
            .filter_map(|k| self.properties.as_str(k))
            .find(|s| !s.is_empty())
    }

    /// Returns the `From` header value
    pub fn from_header(&self) -> Option<String> {
        match (self.sender().filter(|s| !s.is_empty()), self.sender_email()) {
            (Some(name), Some(email)) => Some(format!("{name} <{email}>")),
            (Some(name), None) => Some(name),
            (None, Some(email)) => Some(email.to_string()),
            (None, None) => None,
        }
    }

    /// Returns the headers which can be built from the message properties
    ///
    /// These are `Date`, `From`, `To`, `CC`, `BCC` and `Subject`; empty values
    /// are skipped
    pub fn summary_headers(&self) -> Vec<(&'static str, String)> {
        let mut ret = Vec::new();
        if let Some(date) = self.date_header() {
            ret.push(("Date", date));
        }
        if let Some(from) = self.from_header() {
            ret.push(("From", from));
        }
        for (header, prop) in [
            ("To", "DISPLAY_TO"),
            ("CC", "DISPLAY_CC"),
            ("BCC", "DISPLAY_BCC"),
            ("Subject", "SUBJECT"),
        ] {
            if let Some(v) = self.properties.as_str(prop).filter(|v| !v.is_empty()) {
                ret.push((header, v.to_string()));
            }
        }
        ret
    }

    /// Returns the original transport headers, if available
    ///
    /// Any `Content-Type` header is removed since it describes the original
    /// MIME structure rather than the decoded bodies
    pub fn transport_headers(&self) -> Option<Headers> {
        let raw = self
            .properties
            .text("TRANSPORT_MESSAGE_HEADERS", encoding_rs::UTF_8.into())?;
        Some(Headers::without_content_type(&raw))
    }

    /// Returns the plain text body
    pub fn plain_body(&self) -> Option<Cow<'_, str>> {
        self.properties.text("BODY", self.body_encoding())
    }

    /// Returns the HTML body
    pub fn html_body(&self) -> Option<Cow<'_, str>> {
        self.properties.text("HTML_BODY", self.body_encoding())
    }

    /// Returns the compressed RTF body (not decompressed)
    pub fn rtf_compressed(&self) -> Option<&[u8]> {
        self.properties.as_bytes("RTF_COMPRESSED")
    }
}

/// A message recipient
#[derive(Debug)]
pub struct Recipient<E> {
    /// Storage name
    pub name: String,
    /// Recipient properties
    pub properties: PropertySet<E>,
}

impl<E: ContainerEntry> Recipient<E> {
    fn load<C: Container<Entry = E>>(
        decoder: &PropertyDecoder<'_, C>,
        node: &E,
        depth: usize,
        diag: &mut Diagnostics,
    ) -> Result<Option<Self>, std::io::Error> {
        Ok(decoder
            .decode(node, StreamKind::Storage, depth, diag)?
            .map(|properties| Self {
                name: node.name().to_string(),
                properties,
            }))
    }

    /// Returns the recipient display name
    pub fn display_name(&self) -> Option<&str> {
        ["DISPLAY_NAME", "TRANSMITABLE_DISPLAY_NAME"]
            .into_iter()
            .filter_map(|k| self.properties.as_str(k))
            .find(|s| !s.is_empty())
    }

    /// Returns the recipient e-mail address
    pub fn email(&self) -> Option<&str> {
        ["SMTP_ADDRESS", "EMAIL_ADDRESS"]
            .into_iter()
            .filter_map(|k| self.properties.as_str(k))
            .find(|s| !s.is_empty())
    }

    /// Returns the recipient type
    pub fn kind(&self) -> Option<RecipientType> {
        Some(match self.properties.as_int("RECIPIENT_TYPE")? & 0xf {
            1 => RecipientType::To,
            2 => RecipientType::Cc,
            3 => RecipientType::Bcc,
            _ => RecipientType::Unknown,
        })
    }
}

/// A type of recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientType {
    /// To
    To,
    /// CC
    Cc,
    /// BCC
    Bcc,
    /// Invalid or unknown type
    Unknown,
}

impl RecipientType {
    /// Returns the type as a `str`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::To => "To",
            Self::Cc => "Cc",
            Self::Bcc => "Bcc",
            Self::Unknown => "",
        }
    }
}

/// The content of an attachment
#[derive(Debug)]
pub enum AttachmentContent<'a, E> {
    /// Binary data
    Binary(&'a [u8]),
    /// An embedded message
    Embedded(&'a Message<E>),
    /// No (decodable) content
    Missing,
}

/// A message attachment
#[derive(Debug)]
pub struct Attachment<E> {
    /// Storage name
    pub name: String,
    /// Attachment properties
    pub properties: PropertySet<E>,
    /// The embedded message, if the attachment is one
    pub embedded: Option<Box<Message<E>>>,
}

impl<E: ContainerEntry> Attachment<E> {
    fn load<C: Container<Entry = E>>(
        decoder: &PropertyDecoder<'_, C>,
        node: &E,
        depth: usize,
        diag: &mut Diagnostics,
    ) -> Result<Option<Self>, std::io::Error> {
        let Some(properties) = decoder.decode(node, StreamKind::Storage, depth, diag)? else {
            return Ok(None);
        };
        let embedded = match properties.as_embedded("ATTACH_DATA_BIN") {
            Some(emb) => match Message::load_embedded(decoder, emb, diag) {
                Ok(msg) => msg.map(Box::new),
                Err(e) => {
                    diag.record(DecodeEvent::SubobjectFailed {
                        name: format!("{}/{}", node.name(), emb.entry.name()),
                        error: e.to_string(),
                    });
                    None
                }
            },
            None => None,
        };
        Ok(Some(Self {
            name: node.name().to_string(),
            properties,
            embedded,
        }))
    }

    /// Returns the attachment file name (without any path component)
    pub fn filename(&self) -> Option<&str> {
        let name = ["ATTACH_LONG_FILENAME", "ATTACH_FILENAME", "DISPLAY_NAME"]
            .into_iter()
            .filter_map(|k| self.properties.as_str(k))
            .find(|s| !s.is_empty())?;
        name.rsplit(['/', '\\']).next().filter(|s| !s.is_empty())
    }

    /// Returns the attachment MIME type
    pub fn mime_type(&self) -> &str {
        self.properties
            .as_str("ATTACH_MIME_TAG")
            .filter(|s| !s.is_empty())
            .unwrap_or("application/octet-stream")
    }

    /// Returns whether the attachment is hidden
    pub fn hidden(&self) -> bool {
        self.properties.as_bool("ATTACHMENT_HIDDEN").unwrap_or(false)
    }

    /// Returns the attachment content
    pub fn content(&self) -> AttachmentContent<'_, E> {
        if let Some(msg) = &self.embedded {
            AttachmentContent::Embedded(msg)
        } else if let Some(data) = self.properties.as_bytes("ATTACH_DATA_BIN") {
            AttachmentContent::Binary(data)
        } else {
            AttachmentContent::Missing
        }
    }
}

static CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^content-type[ \t]*:[^\n]*(?:\n[ \t][^\n]*)*(?:\n|\z)").unwrap()
});

/// Internet message headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers(String);

impl Headers {
    /// Wraps a raw header block
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    /// Wraps a raw header block dropping any `Content-Type` header
    pub fn without_content_type(raw: &str) -> Self {
        Self(CONTENT_TYPE.replace_all(raw, "").into_owned())
    }

    /// Returns the raw header block
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the value of the first header named `name` (case insensitive)
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Iterates the headers, unfolding continuation lines
    ///
    /// Lines which are not headers are skipped; an empty line ends the block
    pub fn iter(&self) -> HeaderIter<'_> {
        HeaderIter {
            lines: self.0.lines().peekable(),
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, Cow<'a, str>);
    type IntoIter = HeaderIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over [`Headers`]
pub struct HeaderIter<'a> {
    lines: std::iter::Peekable<std::str::Lines<'a>>,
}

fn is_continuation(line: &str) -> bool {
    line.starts_with([' ', '\t'])
}

impl<'a> Iterator for HeaderIter<'a> {
    type Item = (&'a str, Cow<'a, str>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            if line.is_empty() {
                // End of headers
                self.lines.by_ref().for_each(drop);
                return None;
            }
            if is_continuation(line) {
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let mut value = Cow::from(value.trim());
            while let Some(more) = self.lines.next_if(|l| is_continuation(l)) {
                let more = more.trim();
                if more.is_empty() {
                    continue;
                }
                let v = value.to_mut();
                if !v.is_empty() {
                    v.push(' ');
                }
                v.push_str(more);
            }
            return Some((name.trim(), value));
        }
    }
}
