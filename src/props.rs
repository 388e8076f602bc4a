//! Message properties
//!
//! Every node of a message (the message itself, each recipient, each
//! attachment and each embedded message) carries a property stream: a short
//! header followed by 16-byte entries. Fixed length values live inside the
//! entry, variable length ones in sibling `__substg1.0_` streams and embedded
//! objects in sibling `__substg1.0_` storages.
//!
//! The [`PropertyDecoder`] turns a property stream into a [`PropertySet`]
//! keyed by the semantic tag names in [`tags`]
pub mod codepage;
pub mod loaders;
pub mod tags;

use crate::container::{Container, find_child, substg_name, PROPERTIES_STREAM};
use crate::diag::{DecodeEvent, Diagnostics};
use codepage::{Charset, charset_for_codepage};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io;
use tags::{FixedKind, PropertyType, VariableKind};
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

/// Size of a property entry
pub const ENTRY_SIZE: usize = 16;

/// The position of a property stream in the message tree
///
/// Determines the size of the header preceding the entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// The top level message (32 byte header)
    TopLevel,
    /// An embedded message (24 byte header)
    Nested,
    /// A recipient or attachment storage (8 byte header)
    Storage,
}

impl StreamKind {
    /// Returns the size of the header
    pub fn header_len(self) -> usize {
        match self {
            Self::TopLevel => 32,
            Self::Nested => 24,
            Self::Storage => 8,
        }
    }
}

impl From<bool> for StreamKind {
    fn from(is_top_level: bool) -> Self {
        if is_top_level {
            Self::TopLevel
        } else {
            Self::Nested
        }
    }
}

/// A raw property entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEntry {
    /// Property type
    pub ptype: u16,
    /// Property tag
    pub tag: u16,
    /// Property flags
    pub flags: u32,
    /// Inline value or stream reference
    pub payload: [u8; 8],
}

impl RawEntry {
    /// Parses an entry
    pub fn from_bytes(buf: &[u8; ENTRY_SIZE]) -> Self {
        let [t0, t1, g0, g1, f0, f1, f2, f3, payload @ ..] = *buf;
        Self {
            ptype: u16::from_le_bytes([t0, t1]),
            tag: u16::from_le_bytes([g0, g1]),
            flags: u32::from_le_bytes([f0, f1, f2, f3]),
            payload,
        }
    }

    /// Returns the name of the stream or storage holding the value
    pub fn stream_name(&self) -> String {
        substg_name(self.tag, self.ptype)
    }
}

/// The result of scanning a property stream
#[derive(Debug, Default)]
pub struct Scan {
    /// The complete entries
    pub entries: Vec<RawEntry>,
    /// The number of bytes after the last complete entry
    pub trailing: usize,
}

/// Splits a property stream into raw entries
///
/// The header is skipped; an incomplete final entry is ignored and only
/// accounted for in [`Scan::trailing`]
pub fn scan(buf: &[u8], kind: StreamKind) -> Scan {
    let body = buf.get(kind.header_len()..).unwrap_or(&[]);
    let chunks = body.chunks_exact(ENTRY_SIZE);
    let trailing = chunks.remainder().len();
    let entries = chunks
        .filter_map(|c| <&[u8; ENTRY_SIZE]>::try_from(c).ok())
        .map(RawEntry::from_bytes)
        .collect();
    Scan { entries, trailing }
}

/// Splits a property stream into raw entries
///
/// Convenience wrapper around [`scan`] for message property streams
pub fn scan_entries(buf: &[u8], is_top_level: bool) -> Vec<RawEntry> {
    scan(buf, is_top_level.into()).entries
}

/// The header of a message property stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Next free recipient id
    pub next_recipient_id: u32,
    /// Next free attachment id
    pub next_attachment_id: u32,
    /// Number of recipients
    pub recipient_count: u32,
    /// Number of attachments
    pub attachment_count: u32,
}

impl StreamHeader {
    /// Parses the header of a message (top level or nested) property stream
    pub fn parse(buf: &[u8], kind: StreamKind) -> Option<Self> {
        if kind == StreamKind::Storage {
            return None;
        }
        let hdr = buf.get(8..24)?;
        let rd = |off: usize| {
            u32::from_le_bytes([hdr[off], hdr[off + 1], hdr[off + 2], hdr[off + 3]])
        };
        Some(Self {
            next_recipient_id: rd(0),
            next_attachment_id: rd(4),
            recipient_count: rd(8),
            attachment_count: rd(12),
        })
    }
}

/// A reference to an embedded storage, not yet decoded
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedRef<E> {
    /// The storage entry
    pub entry: E,
    /// The nesting depth of the storage
    pub depth: usize,
}

/// A decoded property value
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue<E> {
    /// No value
    Null,
    /// Boolean value
    Bool(bool),
    /// 16 bit integer
    Int16(u16),
    /// 32 bit integer
    Int32(u32),
    /// 64 bit integer
    Int64(u64),
    /// Timestamp
    Time(time::OffsetDateTime),
    /// Binary value
    Bytes(Vec<u8>),
    /// String value
    String(String),
    /// Embedded storage
    Embedded(EmbeddedRef<E>),
}

impl<E> DecodedValue<E> {
    /// Whether the value is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as boolean
    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    /// Returns the value as integer (of any width)
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int16(v) => Some(u64::from(*v)),
            Self::Int32(v) => Some(u64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as timestamp
    pub fn as_time(&self) -> Option<time::OffsetDateTime> {
        if let Self::Time(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    /// Returns the value as binary
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Self::Bytes(v) = self {
            Some(v.as_slice())
        } else {
            None
        }
    }

    /// Returns the value as string
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(v) = self {
            Some(v.as_str())
        } else {
            None
        }
    }

    /// Returns string values as they are and binary values decoded with
    /// `charset` (replacing invalid sequences)
    pub fn text(&self, charset: Charset) -> Option<Cow<'_, str>> {
        match self {
            Self::String(v) => Some(Cow::from(v.as_str())),
            Self::Bytes(v) => Some(charset.decode_lossy(v)),
            _ => None,
        }
    }

    /// Returns the value as embedded storage reference
    pub fn as_embedded(&self) -> Option<&EmbeddedRef<E>> {
        if let Self::Embedded(v) = self {
            Some(v)
        } else {
            None
        }
    }
}

/// Semantic name to value mapping
pub type PropertyMap<E> = BTreeMap<&'static str, DecodedValue<E>>;

/// The decoded properties of a node
#[derive(Debug, Clone)]
pub struct PropertySet<E> {
    header: Option<StreamHeader>,
    map: PropertyMap<E>,
}

impl<E> PropertySet<E> {
    /// Returns the property stream header (messages only)
    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    /// Returns the value of a property
    pub fn get(&self, name: &str) -> Option<&DecodedValue<E>> {
        self.map.get(name)
    }

    /// Whether a property is set
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Returns a string property
    pub fn as_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(DecodedValue::as_str)
    }

    /// Returns a string property or a binary property decoded with `charset`
    pub fn text(&self, name: &str, charset: Charset) -> Option<Cow<'_, str>> {
        self.get(name)?.text(charset)
    }

    /// Returns a binary property
    pub fn as_bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(DecodedValue::as_bytes)
    }

    /// Returns an integer property
    pub fn as_int(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(DecodedValue::as_int)
    }

    /// Returns a boolean property
    pub fn as_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(DecodedValue::as_bool)
    }

    /// Returns a timestamp property
    pub fn as_time(&self, name: &str) -> Option<time::OffsetDateTime> {
        self.get(name).and_then(DecodedValue::as_time)
    }

    /// Returns an embedded storage property
    pub fn as_embedded(&self, name: &str) -> Option<&EmbeddedRef<E>> {
        self.get(name).and_then(DecodedValue::as_embedded)
    }

    /// Iterates the properties by name
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &DecodedValue<E>)> {
        self.map.iter().map(|(k, v)| (*k, v))
    }

    /// Returns the number of properties
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Consumes the set returning the map
    pub fn into_map(self) -> PropertyMap<E> {
        self.map
    }
}

/// Decoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Maximum nesting depth of storages (the top level message is at depth 0)
    pub max_depth: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self { max_depth: 8 }
    }
}

// An entry which survived classification
enum Slot<E> {
    Fixed(FixedKind, [u8; 8]),
    Variable(VariableKind, Vec<u8>),
    Embedded(E),
}

/// Property stream decoder
pub struct PropertyDecoder<'c, C: Container> {
    container: &'c C,
    options: DecoderOptions,
}

impl<'c, C: Container> PropertyDecoder<'c, C> {
    /// Creates a decoder on the given container
    pub fn new(container: &'c C, options: DecoderOptions) -> Self {
        Self { container, options }
    }

    /// Returns the underlying container
    pub fn container(&self) -> &'c C {
        self.container
    }

    /// Returns the decoder settings
    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Decodes the properties of the top level message
    pub fn decode_message(&self, diag: &mut Diagnostics) -> Result<PropertySet<C::Entry>, io::Error> {
        self.decode(&self.container.root(), StreamKind::TopLevel, 0, diag)?
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Top level message not decoded")
            })
    }

    /// Decodes the properties of an embedded message
    ///
    /// Returns `Ok(None)` if the reference is nested too deep
    pub fn decode_embedded(
        &self,
        emb: &EmbeddedRef<C::Entry>,
        diag: &mut Diagnostics,
    ) -> Result<Option<PropertySet<C::Entry>>, io::Error> {
        self.decode(&emb.entry, StreamKind::Nested, emb.depth, diag)
    }

    /// Decodes the properties of the storage `node`
    ///
    /// Problems with individual properties are recorded into `diag` and never
    /// abort the decode. Failures to list `node` or to read its property stream
    /// are returned as errors
    ///
    /// Returns `Ok(None)` if `depth` exceeds the configured maximum
    pub fn decode(
        &self,
        node: &C::Entry,
        kind: StreamKind,
        depth: usize,
        diag: &mut Diagnostics,
    ) -> Result<Option<PropertySet<C::Entry>>, io::Error> {
        if depth > self.options.max_depth {
            diag.record(DecodeEvent::DepthExceeded { depth });
            return Ok(None);
        }
        let children = self.container.children(node)?;
        let props = find_child(children.iter().cloned(), PROPERTIES_STREAM).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Property stream not found in {:?}", node),
            )
        })?;
        let buf = self.container.read(&props)?;
        let header = StreamHeader::parse(&buf, kind);
        let scan = scan(&buf, kind);
        debug!(
            "Scanned {} property entries ({:?}, depth {})",
            scan.entries.len(),
            kind,
            depth
        );
        if scan.trailing != 0 {
            diag.record(DecodeEvent::TrailingBytes { len: scan.trailing });
        }

        // Classify, read value streams and dedupe (last wins)
        let mut slots: Vec<(&'static str, Slot<C::Entry>)> = Vec::with_capacity(scan.entries.len());
        for raw in scan.entries {
            let Some(name) = tags::tag_name(raw.tag) else {
                diag.record(DecodeEvent::UnknownTag {
                    tag: raw.tag,
                    ptype: raw.ptype,
                });
                continue;
            };
            let Some(ptype) = tags::property_type(raw.ptype) else {
                diag.record(DecodeEvent::UnknownType {
                    tag: raw.tag,
                    ptype: raw.ptype,
                });
                continue;
            };
            let slot = match ptype {
                PropertyType::Fixed(fk) => Slot::Fixed(fk, raw.payload),
                PropertyType::Variable(_) | PropertyType::Embedded => {
                    let stream = raw.stream_name();
                    let Some(entry) = find_child(children.iter().cloned(), &stream) else {
                        diag.record(DecodeEvent::StreamMissing { name, stream });
                        continue;
                    };
                    match ptype {
                        PropertyType::Variable(vk) => match self.container.read(&entry) {
                            Ok(data) => Slot::Variable(vk, data),
                            Err(e) => {
                                diag.record(DecodeEvent::StreamUnreadable {
                                    name,
                                    stream,
                                    error: e.to_string(),
                                });
                                continue;
                            }
                        },
                        _ => Slot::Embedded(entry),
                    }
                }
            };
            if let Some(existing) = slots.iter_mut().find(|(n, _)| *n == name) {
                diag.record(DecodeEvent::DuplicateName { name });
                existing.1 = slot;
            } else {
                slots.push((name, slot));
            }
        }

        // Fixed pass
        let mut map = PropertyMap::new();
        for (name, slot) in slots.iter() {
            if let Slot::Fixed(fk, payload) = slot {
                let value = loaders::load_fixed(*fk, payload);
                if *fk == FixedKind::Time && value.is_null() {
                    diag.record(DecodeEvent::DecodeOverflow { name: *name });
                }
                map.insert(*name, value);
            }
        }

        let body_charset = codepage_charset(&map, "PR_INTERNET_CPID");
        let props_charset = codepage_charset(&map, "PR_MESSAGE_CODEPAGE");

        // Variable and embedded pass
        for (name, slot) in slots {
            match slot {
                Slot::Fixed(..) => {}
                Slot::Variable(vk, data) => {
                    let preferred = if name == "BODY" {
                        [body_charset, props_charset]
                    } else {
                        [props_charset, body_charset]
                    };
                    let candidates: Vec<Charset> = preferred.into_iter().flatten().collect();
                    let (value, fallback) = loaders::load_variable(vk, data, &candidates);
                    if fallback && !candidates.is_empty() {
                        diag.record(DecodeEvent::LegacyFallback { name });
                    }
                    map.insert(name, value);
                }
                Slot::Embedded(entry) => {
                    map.insert(
                        name,
                        DecodedValue::Embedded(EmbeddedRef {
                            entry,
                            depth: depth + 1,
                        }),
                    );
                }
            }
        }
        Ok(Some(PropertySet { header, map }))
    }
}

fn codepage_charset<E>(map: &PropertyMap<E>, name: &str) -> Option<Charset> {
    let cp = map.get(name)?.as_int()?;
    let charset = u32::try_from(cp).ok().and_then(charset_for_codepage);
    if charset.is_none() {
        debug!("Unsupported code page {cp} in {name}");
    }
    charset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemContainer;

    fn entry(ptype: u16, tag: u16, payload: [u8; 8]) -> [u8; 16] {
        let mut ret = [0u8; 16];
        ret[0..2].copy_from_slice(&ptype.to_le_bytes());
        ret[2..4].copy_from_slice(&tag.to_le_bytes());
        ret[4..8].copy_from_slice(&6u32.to_le_bytes());
        ret[8..16].copy_from_slice(&payload);
        ret
    }

    fn fixed32(tag: u16, v: u32) -> [u8; 16] {
        let mut payload = [0u8; 8];
        payload[0..4].copy_from_slice(&v.to_le_bytes());
        entry(0x0003, tag, payload)
    }

    fn stream(kind: StreamKind, entries: &[[u8; 16]]) -> Vec<u8> {
        let mut ret = vec![0u8; kind.header_len()];
        for e in entries {
            ret.extend_from_slice(e);
        }
        ret
    }

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
    }

    #[test]
    fn scanner() {
        let mut buf = stream(
            StreamKind::TopLevel,
            &[
                entry(0x001f, 0x0037, [1, 2, 3, 4, 5, 6, 7, 8]),
                fixed32(0x3ffd, 1252),
                entry(0x0040, 0x0e06, [0xff; 8]),
            ],
        );
        buf[8..12].copy_from_slice(&3u32.to_le_bytes());
        buf[20..24].copy_from_slice(&7u32.to_le_bytes());
        let s = scan(&buf, StreamKind::TopLevel);
        assert_eq!(s.entries.len(), 3);
        assert_eq!(s.trailing, 0);
        assert_eq!(
            s.entries[0],
            RawEntry {
                ptype: 0x001f,
                tag: 0x0037,
                flags: 6,
                payload: [1, 2, 3, 4, 5, 6, 7, 8]
            }
        );
        assert_eq!(s.entries[1].tag, 0x3ffd);
        assert_eq!(s.entries[2].payload, [0xff; 8]);
        assert_eq!(s.entries[0].stream_name(), "__substg1.0_0037001F");
        let hdr = StreamHeader::parse(&buf, StreamKind::TopLevel).unwrap();
        assert_eq!(hdr.next_recipient_id, 3);
        assert_eq!(hdr.attachment_count, 7);
        assert!(StreamHeader::parse(&buf, StreamKind::Storage).is_none());

        // Same bytes read as nested: 8 more bytes of entries
        let s = scan(&buf, StreamKind::Nested);
        assert_eq!(s.entries.len(), 3);
        assert_eq!(s.trailing, 8);
        assert_eq!(scan_entries(&buf, true).len(), 3);

        buf.extend_from_slice(&[0u8; 15]);
        let s = scan(&buf, StreamKind::TopLevel);
        assert_eq!(s.entries.len(), 3);
        assert_eq!(s.trailing, 15);

        assert!(scan(&[0u8; 20], StreamKind::TopLevel).entries.is_empty());
        assert_eq!(scan(&[0u8; 20], StreamKind::TopLevel).trailing, 0);
        assert!(scan(&[], StreamKind::Storage).entries.is_empty());
        assert_eq!(scan(&[0u8; 40], StreamKind::Storage).entries.len(), 2);
    }

    #[test]
    fn two_pass_codepages() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        // String entries come before the code page entries
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(
                StreamKind::TopLevel,
                &[
                    entry(0x001e, 0x0037, [7, 0, 0, 0, 0, 0, 0, 0]),
                    entry(0x001e, 0x1000, [3, 0, 0, 0, 0, 0, 0, 0]),
                    fixed32(0x3ffd, 1251),
                    fixed32(0x3fde, 65001),
                ],
            ),
        );
        // "Привет" in windows-1251
        mc.add_stream(&root, "__substg1.0_0037001E", vec![0xcf, 0xf0, 0xe8, 0xe2, 0xe5, 0xf2]);
        mc.add_stream(&root, "__substg1.0_1000001E", "ä".as_bytes().to_vec());
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default()).decode_message(&mut diag)?;
        assert_eq!(props.as_str("SUBJECT"), Some("Привет"));
        assert_eq!(props.as_str("BODY"), Some("ä"));
        assert_eq!(props.as_int("PR_MESSAGE_CODEPAGE"), Some(1251));
        assert_eq!(props.as_int("PR_INTERNET_CPID"), Some(65001));
        assert!(diag.is_empty(), "{:?}", diag.events());
        Ok(())
    }

    #[test]
    fn legacy_fallback() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(
                StreamKind::TopLevel,
                &[
                    entry(0x001e, 0x0037, [0; 8]),
                    entry(0x001e, 0x0e04, [0; 8]),
                    fixed32(0x3ffd, 65001),
                ],
            ),
        );
        mc.add_stream(&root, "__substg1.0_0037001E", vec![b'c', b'a', b'f', 0xe9]);
        mc.add_stream(&root, "__substg1.0_0E04001E", b"Bob".to_vec());
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default()).decode_message(&mut diag)?;
        assert_eq!(props.as_str("SUBJECT"), Some("café"));
        assert_eq!(props.as_str("DISPLAY_TO"), Some("Bob"));
        assert_eq!(
            diag.events(),
            &[DecodeEvent::LegacyFallback { name: "SUBJECT" }]
        );
        Ok(())
    }

    #[test]
    fn missing_and_unknown() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(
                StreamKind::TopLevel,
                &[
                    entry(0x001f, 0x1000, [0; 8]),
                    entry(0x001f, 0x8004, [0; 8]),
                    entry(0x0005, 0x0037, [0; 8]),
                    entry(0x000d, 0x3701, [0; 8]),
                    entry(0x001f, 0x0e1d, [0; 8]),
                ],
            ),
        );
        mc.add_stream(&root, "__substg1.0_0E1D001F", utf16("Hello\0"));
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default()).decode_message(&mut diag)?;
        assert_eq!(props.len(), 1);
        assert_eq!(props.as_str("NORMALIZED_SUBJECT"), Some("Hello"));
        assert!(!props.contains("BODY"));
        assert!(!props.contains("SUBJECT"));
        assert!(!props.contains("ATTACH_DATA_BIN"));
        assert_eq!(
            diag.events(),
            &[
                DecodeEvent::StreamMissing {
                    name: "BODY",
                    stream: "__substg1.0_1000001F".to_string()
                },
                DecodeEvent::UnknownTag {
                    tag: 0x8004,
                    ptype: 0x001f
                },
                DecodeEvent::UnknownType {
                    tag: 0x0037,
                    ptype: 0x0005
                },
                DecodeEvent::StreamMissing {
                    name: "ATTACH_DATA_BIN",
                    stream: "__substg1.0_3701000D".to_string()
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn duplicates() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(
                StreamKind::TopLevel,
                &[
                    fixed32(0x0e07, 1),
                    entry(0x001e, 0x0037, [0; 8]),
                    fixed32(0x0e07, 2),
                    entry(0x001f, 0x0037, [0; 8]),
                    entry(0x0102, 0x1000, [0; 8]),
                ],
            ),
        );
        mc.add_stream(&root, "__substg1.0_0037001E", b"first".to_vec());
        mc.add_stream(&root, "__substg1.0_0037001F", utf16("second"));
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default()).decode_message(&mut diag)?;
        assert_eq!(props.as_int("MESSAGE_FLAGS"), Some(2));
        assert_eq!(props.as_str("SUBJECT"), Some("second"));
        assert_eq!(
            diag.count(|e| matches!(e, DecodeEvent::DuplicateName { .. })),
            2
        );
        Ok(())
    }

    #[test]
    fn unreadable_duplicate() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(
                StreamKind::TopLevel,
                &[entry(0x001f, 0x0037, [0; 8]), entry(0x001e, 0x0037, [0; 8])],
            ),
        );
        mc.add_stream(&root, "__substg1.0_0037001F", utf16("Hi"));
        // A storage where a stream is expected
        mc.add_storage(&root, "__substg1.0_0037001E");
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default()).decode_message(&mut diag)?;
        assert_eq!(props.as_str("SUBJECT"), Some("Hi"));
        assert_eq!(diag.len(), 1);
        assert!(matches!(
            &diag.events()[0],
            DecodeEvent::StreamUnreadable { name: "SUBJECT", stream, .. } if stream == "__substg1.0_0037001E"
        ));
        Ok(())
    }

    #[test]
    fn ascii_codepage() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(
                StreamKind::TopLevel,
                &[
                    entry(0x001e, 0x0037, [0; 8]),
                    fixed32(0x3ffd, 20127),
                    fixed32(0x3fde, 1251),
                ],
            ),
        );
        mc.add_stream(&root, "__substg1.0_0037001E", vec![0xe9]);
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default()).decode_message(&mut diag)?;
        assert_eq!(props.as_str("SUBJECT"), Some("й"));
        assert!(diag.is_empty(), "{:?}", diag.events());
        Ok(())
    }

    #[test]
    fn storage_with_message_header() -> Result<(), io::Error> {
        // An attachment written with a 24 byte header still decodes: the
        // reserved bytes past the first 8 read as an entry with tag 0
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(StreamKind::Nested, &[entry(0x001f, 0x3707, [0; 8])]),
        );
        mc.add_stream(&root, "__substg1.0_3707001F", utf16("report.pdf"));
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default())
            .decode(&root, StreamKind::Storage, 1, &mut diag)?
            .unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props.as_str("ATTACH_LONG_FILENAME"), Some("report.pdf"));
        assert_eq!(
            diag.events(),
            &[DecodeEvent::UnknownTag { tag: 0, ptype: 0 }]
        );
        Ok(())
    }

    #[test]
    fn fixed_values() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(
                StreamKind::TopLevel,
                &[
                    entry(0x0040, 0x0e06, 0x01BAB44B12F98800u64.to_le_bytes()),
                    entry(0x0040, 0x0039, [0xff; 8]),
                    entry(0x000b, 0x0e1b, [1, 0, 0, 0, 0, 0, 0, 0]),
                    entry(0x0002, 0x0017, [2, 0, 0xff, 0xff, 0, 0, 0, 0]),
                    entry(0x0001, 0x0036, [0xff; 8]),
                ],
            ),
        );
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default()).decode_message(&mut diag)?;
        assert_eq!(
            props.as_time("MESSAGE_DELIVERY_TIME").map(|t| t.unix_timestamp()),
            Some(816543824)
        );
        assert_eq!(props.get("CLIENT_SUBMIT_TIME"), Some(&DecodedValue::Null));
        assert_eq!(props.as_bool("HASATTACH"), Some(true));
        assert_eq!(props.get("IMPORTANCE"), Some(&DecodedValue::Int16(2)));
        assert!(props.get("SENSITIVITY").unwrap().is_null());
        assert_eq!(
            diag.events(),
            &[DecodeEvent::DecodeOverflow {
                name: "CLIENT_SUBMIT_TIME"
            }]
        );
        Ok(())
    }

    #[test]
    fn embedded() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(
            &root,
            PROPERTIES_STREAM,
            stream(StreamKind::Storage, &[entry(0x000d, 0x3701, [0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0])]),
        );
        let emb = mc.add_storage(&root, "__substg1.0_3701000D");
        mc.add_stream(
            &emb,
            PROPERTIES_STREAM,
            stream(StreamKind::Nested, &[entry(0x001f, 0x0037, [0; 8])]),
        );
        mc.add_stream(&emb, "__substg1.0_0037001F", utf16("Inner\0"));

        let decoder = PropertyDecoder::new(&mc, DecoderOptions::default());
        let mut diag = Diagnostics::new();
        let props = decoder
            .decode(&root, StreamKind::Storage, 1, &mut diag)?
            .unwrap();
        assert!(props.header().is_none());
        let emb_ref = props.as_embedded("ATTACH_DATA_BIN").unwrap();
        assert_eq!(emb_ref.entry, emb);
        assert_eq!(emb_ref.depth, 2);
        let inner = decoder.decode_embedded(emb_ref, &mut diag)?.unwrap();
        assert_eq!(inner.as_str("SUBJECT"), Some("Inner"));
        assert!(inner.header().is_some());
        assert!(diag.is_empty());

        // Too deep
        let decoder = PropertyDecoder::new(&mc, DecoderOptions { max_depth: 1 });
        assert!(decoder.decode_embedded(emb_ref, &mut diag)?.is_none());
        assert_eq!(diag.events(), &[DecodeEvent::DepthExceeded { depth: 2 }]);
        Ok(())
    }

    #[test]
    fn no_property_stream() {
        let mut mc = MemContainer::new();
        let root = mc.root();
        mc.add_stream(&root, "__substg1.0_0037001F", utf16("orphan"));
        let mut diag = Diagnostics::new();
        let err = PropertyDecoder::new(&mc, DecoderOptions::default())
            .decode_message(&mut diag)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn trailing_bytes() -> Result<(), io::Error> {
        let mut mc = MemContainer::new();
        let root = mc.root();
        let mut buf = stream(StreamKind::TopLevel, &[fixed32(0x0e08, 1234)]);
        buf.extend_from_slice(&[1, 2, 3]);
        mc.add_stream(&root, PROPERTIES_STREAM, buf);
        let mut diag = Diagnostics::new();
        let props = PropertyDecoder::new(&mc, DecoderOptions::default()).decode_message(&mut diag)?;
        assert_eq!(props.as_int("MESSAGE_SIZE"), Some(1234));
        assert_eq!(diag.events(), &[DecodeEvent::TrailingBytes { len: 3 }]);
        Ok(())
    }
}
