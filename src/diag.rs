//! Decode diagnostics
//!
//! Problems with individual properties never abort a decode: they are recorded
//! as [`DecodeEvent`]s into a [`Diagnostics`] sink owned by the caller, and
//! traced at the same time
use std::fmt;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

/// A non fatal event encountered while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// The property tag is not in the registry: the entry was discarded
    UnknownTag {
        /// Property tag
        tag: u16,
        /// Property type
        ptype: u16,
    },
    /// The property type is not supported: the entry was discarded
    UnknownType {
        /// Property tag
        tag: u16,
        /// Property type
        ptype: u16,
    },
    /// The stream or storage holding the value does not exist
    StreamMissing {
        /// Property name
        name: &'static str,
        /// Name of the missing stream
        stream: String,
    },
    /// The stream holding the value could not be read
    StreamUnreadable {
        /// Property name
        name: &'static str,
        /// Name of the stream
        stream: String,
        /// Error description
        error: String,
    },
    /// A fixed length value is out of range and was decoded as `Null`
    DecodeOverflow {
        /// Property name
        name: &'static str,
    },
    /// No candidate encoding could decode the string: the legacy encoding was used
    LegacyFallback {
        /// Property name
        name: &'static str,
    },
    /// A property appeared more than once: the last occurrence was kept
    DuplicateName {
        /// Property name
        name: &'static str,
    },
    /// The property stream length is not a multiple of the entry size
    TrailingBytes {
        /// Number of ignored bytes
        len: usize,
    },
    /// A node is nested deeper than allowed and was not decoded
    DepthExceeded {
        /// Depth of the node
        depth: usize,
    },
    /// An attachment or recipient storage could not be decoded
    SubobjectFailed {
        /// Storage name
        name: String,
        /// Error description
        error: String,
    },
}

impl fmt::Display for DecodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag { tag, ptype } => {
                write!(f, "Unknown property tag {tag:04x} (type {ptype:04x})")
            }
            Self::UnknownType { tag, ptype } => {
                write!(f, "Unhandled property type {ptype:04x} (tag {tag:04x})")
            }
            Self::StreamMissing { name, stream } => {
                write!(f, "Stream {stream} missing for property {name}")
            }
            Self::StreamUnreadable {
                name,
                stream,
                error,
            } => write!(f, "Failed to read stream {stream} for property {name}: {error}"),
            Self::DecodeOverflow { name } => write!(f, "Value of {name} is out of range"),
            Self::LegacyFallback { name } => {
                write!(f, "Property {name} decoded with the legacy fallback encoding")
            }
            Self::DuplicateName { name } => write!(f, "Duplicate property {name}"),
            Self::TrailingBytes { len } => {
                write!(f, "Ignored {len} trailing bytes in property stream")
            }
            Self::DepthExceeded { depth } => write!(f, "Nesting depth {depth} exceeded"),
            Self::SubobjectFailed { name, error } => write!(f, "Failed to decode {name}: {error}"),
        }
    }
}

/// Collects [`DecodeEvent`]s
#[derive(Debug, Default)]
pub struct Diagnostics {
    events: Vec<DecodeEvent>,
}

impl Diagnostics {
    /// Creates an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Records and traces an event
    pub fn record(&mut self, event: DecodeEvent) {
        match &event {
            DecodeEvent::UnknownTag { .. } => debug!("{event}"),
            DecodeEvent::UnknownType { .. }
            | DecodeEvent::StreamMissing { .. }
            | DecodeEvent::StreamUnreadable { .. }
            | DecodeEvent::SubobjectFailed { .. } => error!("{event}"),
            _ => warn!("{event}"),
        }
        self.events.push(event);
    }

    /// Returns the recorded events in order
    pub fn events(&self) -> &[DecodeEvent] {
        &self.events
    }

    /// Returns the number of events matching `pred`
    pub fn count<F: Fn(&DecodeEvent) -> bool>(&self, pred: F) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of recorded events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Consumes the sink returning the events
    pub fn into_events(self) -> Vec<DecodeEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_count() {
        let mut diag = Diagnostics::new();
        assert!(diag.is_empty());
        diag.record(DecodeEvent::UnknownTag {
            tag: 0x8001,
            ptype: 0x001f,
        });
        diag.record(DecodeEvent::TrailingBytes { len: 3 });
        diag.record(DecodeEvent::UnknownTag {
            tag: 0x8002,
            ptype: 0x0003,
        });
        assert_eq!(diag.len(), 3);
        assert_eq!(
            diag.count(|e| matches!(e, DecodeEvent::UnknownTag { .. })),
            2
        );
        assert_eq!(
            diag.events()[1].to_string(),
            "Ignored 3 trailing bytes in property stream"
        );
        assert_eq!(
            diag.events()[0].to_string(),
            "Unknown property tag 8001 (type 001f)"
        );
    }
}
