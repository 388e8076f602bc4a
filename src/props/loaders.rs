//! Value loaders
//!
//! Fixed length values are decoded from the 8-byte entry payload; variable
//! length values from the content of their stream
use super::DecodedValue;
use super::codepage::{Charset, decode_string8, decode_unicode};
use super::tags::{FixedKind, VariableKind};

/// Difference between the FILETIME epoch (1601-01-01) and the unix epoch in
/// 100ns ticks
const FILETIME_UNIX_DIFF: i128 = 116444736000000000;

/// Converts a FILETIME (100ns ticks since 1601-01-01 UTC) to a timestamp
///
/// Returns `None` if the result cannot be represented
pub fn filetime_to_datetime(ticks: u64) -> Option<time::OffsetDateTime> {
    let ticks = i128::from(ticks) - FILETIME_UNIX_DIFF;
    time::OffsetDateTime::from_unix_timestamp_nanos(ticks * 100).ok()
}

/// Decodes a fixed length value from the entry payload
///
/// Never fails: a time which cannot be represented yields [`DecodedValue::Null`]
pub fn load_fixed<E>(kind: FixedKind, payload: &[u8; 8]) -> DecodedValue<E> {
    let [b0, b1, b2, b3, ..] = *payload;
    match kind {
        FixedKind::Null => DecodedValue::Null,
        FixedKind::Bool => DecodedValue::Bool(b0 == 1),
        FixedKind::Int16 => DecodedValue::Int16(u16::from_le_bytes([b0, b1])),
        FixedKind::Int32 => DecodedValue::Int32(u32::from_le_bytes([b0, b1, b2, b3])),
        FixedKind::Int64 => DecodedValue::Int64(u64::from_le_bytes(*payload)),
        FixedKind::Time => filetime_to_datetime(u64::from_le_bytes(*payload))
            .map(DecodedValue::Time)
            .unwrap_or(DecodedValue::Null),
    }
}

/// Decodes a variable length value from its stream content
///
/// Legacy strings are tried against `candidates` in order; the returned flag is
/// `true` if none of them succeeded and the fallback encoding was used
pub fn load_variable<E>(
    kind: VariableKind,
    data: Vec<u8>,
    candidates: &[Charset],
) -> (DecodedValue<E>, bool) {
    match kind {
        VariableKind::Binary => (DecodedValue::Bytes(data), false),
        VariableKind::Unicode => (DecodedValue::String(decode_unicode(&data)), false),
        VariableKind::String8 => {
            let (s, fallback) = decode_string8(&data, candidates);
            (DecodedValue::String(s), fallback)
        }
    }
}
