//! Property tag and type registries
//!
//! Static and read-only: tags map to the semantic names used as keys in a
//! [`PropertyMap`](super::PropertyMap), types map to the strategy used to load
//! the value

/// How a fixed length value is stored in the 8-byte entry payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedKind {
    /// PtypNull
    Null,
    /// PtypBoolean
    Bool,
    /// PtypInteger16
    Int16,
    /// PtypInteger32
    Int32,
    /// PtypInteger64
    Int64,
    /// PtypTime
    Time,
}

/// How a variable length value is stored in its own stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// PtypBinary
    Binary,
    /// PtypString8
    String8,
    /// PtypString
    Unicode,
}

/// The loading strategy for a property type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// Value inline in the entry payload
    Fixed(FixedKind),
    /// Value in a `__substg1.0_` stream
    Variable(VariableKind),
    /// Value is a `__substg1.0_` storage (embedded message or object)
    Embedded,
}

/// Returns the loading strategy for property type `ptype`
///
/// Floating point, currency, error, GUID and multi-valued types are not
/// supported and yield `None`
pub fn property_type(ptype: u16) -> Option<PropertyType> {
    Some(match ptype {
        0x0001 /* PtypNull */ => PropertyType::Fixed(FixedKind::Null),
        0x000b /* PtypBoolean */ => PropertyType::Fixed(FixedKind::Bool),
        0x0002 /* PtypInteger16 */ => PropertyType::Fixed(FixedKind::Int16),
        0x0003 /* PtypInteger32 */ => PropertyType::Fixed(FixedKind::Int32),
        0x0014 /* PtypInteger64 */ => PropertyType::Fixed(FixedKind::Int64),
        0x0040 /* PtypTime */ => PropertyType::Fixed(FixedKind::Time),
        0x0102 /* PtypBinary */ => PropertyType::Variable(VariableKind::Binary),
        0x001e /* PtypString8 */ => PropertyType::Variable(VariableKind::String8),
        0x001f /* PtypString */ => PropertyType::Variable(VariableKind::Unicode),
        0x000d /* PtypObject */ => PropertyType::Embedded,
        _ => return None,
    })
}

/// A registered property tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyTag {
    /// Tag id
    pub id: u16,
    /// Semantic name
    pub name: &'static str,
}

/// Looks up a property tag in the registry
pub fn lookup_tag(id: u16) -> Option<PropertyTag> {
    TAGS.binary_search_by_key(&id, |&(k, _)| k)
        .ok()
        .map(|i| PropertyTag {
            id,
            name: TAGS[i].1,
        })
}

/// Returns the semantic name of property tag `id`
pub fn tag_name(id: u16) -> Option<&'static str> {
    lookup_tag(id).map(|t| t.name)
}

// NOTE: this (k, v) slice MUST be sorted by k!
static TAGS: &[(u16, &str)] = &[
    (0x0001, "ACKNOWLEDGEMENT_MODE"),
    (0x0002, "ALTERNATE_RECIPIENT_ALLOWED"),
    (0x0003, "AUTHORIZING_USERS"),
    (0x0004, "AUTO_FORWARD_COMMENT"),
    (0x0005, "AUTO_FORWARDED"),
    (0x0006, "CONTENT_CONFIDENTIALITY_ALGORITHM_ID"),
    (0x0007, "CONTENT_CORRELATOR"),
    (0x0008, "CONTENT_IDENTIFIER"),
    (0x0009, "CONTENT_LENGTH"),
    (0x000a, "CONTENT_RETURN_REQUESTED"),
    (0x000b, "CONVERSATION_KEY"),
    (0x000c, "CONVERSION_EITS"),
    (0x000d, "CONVERSION_WITH_LOSS_PROHIBITED"),
    (0x000e, "CONVERTED_EITS"),
    (0x000f, "DEFERRED_DELIVERY_TIME"),
    (0x0010, "DELIVER_TIME"),
    (0x0011, "DISCARD_REASON"),
    (0x0012, "DISCLOSURE_OF_RECIPIENTS"),
    (0x0013, "DL_EXPANSION_HISTORY"),
    (0x0014, "DL_EXPANSION_PROHIBITED"),
    (0x0015, "EXPIRY_TIME"),
    (0x0016, "IMPLICIT_CONVERSION_PROHIBITED"),
    (0x0017, "IMPORTANCE"),
    (0x0018, "IPM_ID"),
    (0x0019, "LATEST_DELIVERY_TIME"),
    (0x001a, "MESSAGE_CLASS"),
    (0x001b, "MESSAGE_DELIVERY_ID"),
    (0x001e, "MESSAGE_SECURITY_LABEL"),
    (0x001f, "OBSOLETED_IPMS"),
    (0x0020, "ORIGINALLY_INTENDED_RECIPIENT_NAME"),
    (0x0021, "ORIGINAL_EITS"),
    (0x0022, "ORIGINATOR_CERTIFICATE"),
    (0x0023, "ORIGINATOR_DELIVERY_REPORT_REQUESTED"),
    (0x0024, "ORIGINATOR_RETURN_ADDRESS"),
    (0x0025, "PARENT_KEY"),
    (0x0026, "PRIORITY"),
    (0x0027, "ORIGIN_CHECK"),
    (0x0028, "PROOF_OF_SUBMISSION_REQUESTED"),
    (0x0029, "READ_RECEIPT_REQUESTED"),
    (0x002a, "RECEIPT_TIME"),
    (0x002b, "RECIPIENT_REASSIGNMENT_PROHIBITED"),
    (0x002c, "REDIRECTION_HISTORY"),
    (0x002d, "RELATED_IPMS"),
    (0x002e, "ORIGINAL_SENSITIVITY"),
    (0x002f, "LANGUAGES"),
    (0x0030, "REPLY_TIME"),
    (0x0031, "REPORT_TAG"),
    (0x0032, "REPORT_TIME"),
    (0x0033, "RETURNED_IPM"),
    (0x0034, "SECURITY"),
    (0x0035, "INCOMPLETE_COPY"),
    (0x0036, "SENSITIVITY"),
    (0x0037, "SUBJECT"),
    (0x0038, "SUBJECT_IPM"),
    (0x0039, "CLIENT_SUBMIT_TIME"),
    (0x003a, "REPORT_NAME"),
    (0x003b, "SENT_REPRESENTING_SEARCH_KEY"),
    (0x003d, "SUBJECT_PREFIX"),
    (0x003f, "RECEIVED_BY_ENTRYID"),
    (0x0040, "RECEIVED_BY_NAME"),
    (0x0041, "SENT_REPRESENTING_ENTRYID"),
    (0x0042, "SENT_REPRESENTING_NAME"),
    (0x0043, "RCVD_REPRESENTING_ENTRYID"),
    (0x0044, "RCVD_REPRESENTING_NAME"),
    (0x0047, "MESSAGE_SUBMISSION_ID"),
    (0x0051, "RECEIVED_BY_SEARCH_KEY"),
    (0x0052, "RCVD_REPRESENTING_SEARCH_KEY"),
    (0x0057, "MESSAGE_TO_ME"),
    (0x0058, "MESSAGE_CC_ME"),
    (0x0060, "START_DATE"),
    (0x0061, "END_DATE"),
    (0x0064, "SENT_REPRESENTING_ADDRTYPE"),
    (0x0065, "SENT_REPRESENTING_EMAIL_ADDRESS"),
    (0x0070, "CONVERSATION_TOPIC"),
    (0x0071, "CONVERSATION_INDEX"),
    (0x0075, "RECEIVED_BY_ADDRTYPE"),
    (0x0076, "RECEIVED_BY_EMAIL_ADDRESS"),
    (0x007d, "TRANSPORT_MESSAGE_HEADERS"),
    (0x0c15, "RECIPIENT_TYPE"),
    (0x0c17, "REPLY_REQUESTED"),
    (0x0c19, "SENDER_ENTRYID"),
    (0x0c1a, "SENDER_NAME"),
    (0x0c1d, "SENDER_SEARCH_KEY"),
    (0x0c1e, "SENDER_ADDRTYPE"),
    (0x0c1f, "SENDER_EMAIL_ADDRESS"),
    (0x0e01, "DELETE_AFTER_SUBMIT"),
    (0x0e02, "DISPLAY_BCC"),
    (0x0e03, "DISPLAY_CC"),
    (0x0e04, "DISPLAY_TO"),
    (0x0e06, "MESSAGE_DELIVERY_TIME"),
    (0x0e07, "MESSAGE_FLAGS"),
    (0x0e08, "MESSAGE_SIZE"),
    (0x0e0f, "RESPONSIBILITY"),
    (0x0e12, "MESSAGE_RECIPIENTS"),
    (0x0e13, "MESSAGE_ATTACHMENTS"),
    (0x0e17, "MESSAGE_STATUS"),
    (0x0e1b, "HASATTACH"),
    (0x0e1d, "NORMALIZED_SUBJECT"),
    (0x0e1f, "RTF_IN_SYNC"),
    (0x0e20, "ATTACH_SIZE"),
    (0x0e21, "ATTACH_NUM"),
    (0x0e28, "PRIMARY_SEND_ACCOUNT"),
    (0x0e29, "NEXT_SEND_ACCOUNT"),
    (0x0ff4, "ACCESS"),
    (0x0ff7, "ACCESS_LEVEL"),
    (0x0ff9, "RECORD_KEY"),
    (0x0ffe, "OBJECT_TYPE"),
    (0x0fff, "ENTRYID"),
    (0x1000, "BODY"),
    (0x1006, "RTF_SYNC_BODY_CRC"),
    (0x1007, "RTF_SYNC_BODY_COUNT"),
    (0x1008, "RTF_SYNC_BODY_TAG"),
    (0x1009, "RTF_COMPRESSED"),
    (0x1010, "RTF_SYNC_PREFIX_COUNT"),
    (0x1011, "RTF_SYNC_TRAILING_COUNT"),
    (0x1013, "HTML_BODY"),
    (0x1035, "INTERNET_MESSAGE_ID"),
    (0x1039, "INTERNET_REFERENCES"),
    (0x1042, "IN_REPLY_TO_ID"),
    (0x1080, "ICON_INDEX"),
    (0x3001, "DISPLAY_NAME"),
    (0x3002, "ADDRTYPE"),
    (0x3003, "EMAIL_ADDRESS"),
    (0x3007, "CREATION_TIME"),
    (0x3008, "LAST_MODIFICATION_TIME"),
    (0x300b, "SEARCH_KEY"),
    (0x3701, "ATTACH_DATA_BIN"),
    (0x3702, "ATTACH_ENCODING"),
    (0x3703, "ATTACH_EXTENSION"),
    (0x3704, "ATTACH_FILENAME"),
    (0x3705, "ATTACH_METHOD"),
    (0x3707, "ATTACH_LONG_FILENAME"),
    (0x3708, "ATTACH_PATHNAME"),
    (0x3709, "ATTACH_RENDERING"),
    (0x370a, "ATTACH_TAG"),
    (0x370b, "RENDERING_POSITION"),
    (0x370d, "ATTACH_LONG_PATHNAME"),
    (0x370e, "ATTACH_MIME_TAG"),
    (0x3712, "ATTACH_CONTENT_ID"),
    (0x3713, "ATTACH_CONTENT_LOCATION"),
    (0x3714, "ATTACH_FLAGS"),
    (0x39fe, "SMTP_ADDRESS"),
    (0x3a00, "ACCOUNT"),
    (0x3a20, "TRANSMITABLE_DISPLAY_NAME"),
    (0x3fde, "PR_INTERNET_CPID"),
    (0x3ff1, "MESSAGE_LOCALE_ID"),
    (0x3ff8, "CREATOR_NAME"),
    (0x3ffa, "LAST_MODIFIER_NAME"),
    (0x3ffd, "PR_MESSAGE_CODEPAGE"),
    (0x5d01, "SENDER_SMTP_ADDRESS"),
    (0x5d02, "SENT_REPRESENTING_SMTP_ADDRESS"),
    (0x7ffe, "ATTACHMENT_HIDDEN"),
    (0x7fff, "ATTACHMENT_CONTACT_PHOTO"),
];
