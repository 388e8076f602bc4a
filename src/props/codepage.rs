//! Code page table and legacy string decoding
use encoding_rs::Encoding;
use std::borrow::Cow;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

/// The encoding used when no candidate can decode a legacy string
pub static FALLBACK_ENCODING: &Encoding = encoding_rs::WINDOWS_1252;

// Windows code page to encoding label
// NOTE: this (k, v) slice MUST be sorted by k!
static CPMAP: &[(u32, &str)] = &[
    (708, "asmo-708"),
    (866, "ibm866"),
    (874, "windows-874"),
    (932, "shift_jis"),
    (936, "gbk"),
    (949, "euc-kr"),
    (950, "big5"),
    (1200, "utf-16le"),
    (1201, "utf-16be"),
    (1250, "windows-1250"),
    (1251, "windows-1251"),
    (1252, "windows-1252"),
    (1253, "windows-1253"),
    (1254, "windows-1254"),
    (1255, "windows-1255"),
    (1256, "windows-1256"),
    (1257, "windows-1257"),
    (1258, "windows-1258"),
    (10000, "macintosh"),
    (10007, "x-mac-cyrillic"),
    (20127, "us-ascii"),
    (20866, "koi8-r"),
    (20932, "euc-jp"),
    (21866, "koi8-u"),
    (28591, "iso-8859-1"),
    (28592, "iso-8859-2"),
    (28593, "iso-8859-3"),
    (28594, "iso-8859-4"),
    (28595, "iso-8859-5"),
    (28596, "iso-8859-6"),
    (28597, "iso-8859-7"),
    (28598, "iso-8859-8"),
    (28599, "iso-8859-9"),
    (28603, "iso-8859-13"),
    (28605, "iso-8859-15"),
    (38598, "iso-8859-8-i"),
    (50220, "iso-2022-jp"),
    (51932, "euc-jp"),
    (51949, "euc-kr"),
    (54936, "gb18030"),
    (65001, "utf-8"),
];

/// Returns the encoding name for a Windows code page
pub fn codepage_name(cp: u32) -> Option<&'static str> {
    CPMAP
        .binary_search_by_key(&cp, |&(k, _)| k)
        .ok()
        .map(|i| CPMAP[i].1)
}

/// A character set legacy strings are decoded with
///
/// ASCII and Latin-1 are kept apart from [`Encoding`] because the WHATWG
/// labels for both resolve to windows-1252
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// 7-bit ASCII: any byte above 0x7f is invalid
    Ascii,
    /// ISO-8859-1: each byte is the code point of the same value
    Latin1,
    /// Any other encoding
    Encoding(&'static Encoding),
}

impl From<&'static Encoding> for Charset {
    fn from(enc: &'static Encoding) -> Self {
        Self::Encoding(enc)
    }
}

impl Charset {
    /// Returns the charset name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascii => "us-ascii",
            Self::Latin1 => "iso-8859-1",
            Self::Encoding(enc) => enc.name(),
        }
    }

    /// Decodes `bytes`, returning `None` on the first invalid sequence
    pub fn decode_strict<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Self::Ascii if !bytes.is_ascii() => None,
            Self::Ascii | Self::Latin1 => Some(encoding_rs::mem::decode_latin1(bytes)),
            Self::Encoding(enc) => enc.decode_without_bom_handling_and_without_replacement(bytes),
        }
    }

    /// Decodes `bytes`, replacing invalid sequences with U+FFFD
    ///
    /// A BOM is removed where the encoding defines one
    pub fn decode_lossy<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Self::Ascii if !bytes.is_ascii() => Cow::Owned(
                bytes
                    .iter()
                    .map(|&b| if b.is_ascii() { char::from(b) } else { '\u{fffd}' })
                    .collect(),
            ),
            Self::Ascii | Self::Latin1 => encoding_rs::mem::decode_latin1(bytes),
            Self::Encoding(enc) if *enc == FALLBACK_ENCODING => Cow::Owned(decode_legacy(bytes)),
            Self::Encoding(enc) => enc.decode_with_bom_removal(bytes).0,
        }
    }
}

/// Returns the charset for a Windows code page
///
/// `None` is returned for unknown code pages
pub fn charset_for_codepage(cp: u32) -> Option<Charset> {
    match cp {
        20127 => return Some(Charset::Ascii),
        28591 => return Some(Charset::Latin1),
        _ => {}
    }
    let label = codepage_name(cp)?;
    let enc = Encoding::for_label(label.as_bytes());
    if enc.is_none() {
        debug!("Code page {cp} ({label}) has no decoder");
    }
    enc.map(Charset::Encoding)
}

/// Decodes with [`FALLBACK_ENCODING`]
///
/// The five bytes windows-1252 leaves undefined (0x81, 0x8d, 0x8f, 0x90 and
/// 0x9d) become U+FFFD rather than C1 controls
pub fn decode_legacy(bytes: &[u8]) -> String {
    let (s, _) = FALLBACK_ENCODING.decode_without_bom_handling(bytes);
    s.chars()
        .map(|c| match c {
            '\u{81}' | '\u{8d}' | '\u{8f}' | '\u{90}' | '\u{9d}' => '\u{fffd}',
            c => c,
        })
        .collect()
}

/// Decodes a legacy 8-bit string
///
/// Each candidate charset is tried in order in strict mode; if all of them
/// fail (or none is given) the bytes are decoded with [`FALLBACK_ENCODING`],
/// replacing invalid sequences. This never fails
///
/// The returned flag is `true` when the fallback was used
pub fn decode_string8(bytes: &[u8], candidates: &[Charset]) -> (String, bool) {
    for charset in candidates {
        if let Some(s) = charset.decode_strict(bytes) {
            return (s.into_owned(), false);
        }
        debug!("String is not valid {}", charset.name());
    }
    (decode_legacy(bytes), true)
}

/// Decodes a UTF-16LE string
///
/// A leading BOM is removed and invalid sequences are replaced; exactly one
/// trailing NUL character, if present, is stripped
pub fn decode_unicode(bytes: &[u8]) -> String {
    let (s, _) = encoding_rs::UTF_16LE.decode_with_bom_removal(bytes);
    match s.strip_suffix('\0') {
        Some(stripped) => stripped.to_string(),
        None => s.into_owned(),
    }
}
