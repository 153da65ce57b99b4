//! MIME decoding: header text, plain-text body and attachment discovery.
//!
//! Raw messages are parsed with `mail-parser` and immediately converted into a
//! [`MimePart`] tree, so the traversal rules below do not depend on the parser's
//! object model. Everything in this module is pure: no I/O, no logging side
//! channels beyond `log` warnings for lossy decodes.

use std::borrow::Cow;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use log::{debug, warn};
use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};
use thiserror::Error;

use super::error::{EmailError, Result};

/// Maximum nesting depth converted from the parser tree.
const MAX_DEPTH: usize = 32;

/// Content type assumed when a part declares none (RFC 2045 §5.2).
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Encoded words in the wild often drop base64 padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A non-fatal problem met while turning bytes into text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeWarning {
    #[error("unsupported charset '{0}', decoded lossily")]
    UnsupportedCharset(String),

    #[error("invalid byte sequence for charset '{0}', replaced")]
    InvalidBytes(String),

    #[error("malformed encoded word '{0}', kept verbatim")]
    MalformedWord(String),
}

/// Text produced by a decode, with any warnings raised on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub warnings: Vec<DecodeWarning>,
}

/// A single-payload MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPart {
    /// Lowercased `type/subtype`.
    pub content_type: String,
    /// Declared charset. `None` means the payload is already UTF-8 or unlabelled.
    pub charset: Option<String>,
    /// Disposition value (`attachment`, `inline`, ...) when the header is present.
    pub disposition: Option<String>,
    /// Filename as declared, possibly still encoded-word text.
    pub filename: Option<String>,
    /// Transfer-decoded payload.
    pub body: Vec<u8>,
}

/// A MIME part tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimePart {
    Leaf(LeafPart),
    Container {
        content_type: String,
        children: Vec<MimePart>,
    },
}

/// An attachment found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    /// Decoded display filename.
    pub filename: String,
    /// Declared content type.
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A message with its headers decoded for display.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub subject: String,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Raw `Date` header.
    pub date: Option<String>,
    pub body: String,
    pub root: MimePart,
    pub warnings: Vec<DecodeWarning>,
}

impl DecodedMessage {
    /// Text searched by keyword filters: subject, a space, then the body.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.subject, self.body)
    }

    pub fn has_attachment(&self) -> bool {
        has_attachment(&self.root)
    }

    pub fn attachments(&self) -> Vec<AttachmentRecord> {
        extract_attachments(&self.root)
    }
}

impl MimePart {
    /// Leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&LeafPart> {
        let mut leaves = Vec::new();
        let mut stack = vec![self];

        while let Some(part) = stack.pop() {
            match part {
                MimePart::Leaf(leaf) => leaves.push(leaf),
                MimePart::Container { children, .. } => {
                    // Reverse so the first child is visited first.
                    stack.extend(children.iter().rev());
                }
            }
        }

        leaves
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, MimePart::Container { .. })
    }
}

/// Parses a raw RFC 5322 message and decodes its headers and body.
///
/// Fails only when the bytes cannot be parsed as a message at all; every
/// charset or encoded-word problem degrades to a [`DecodeWarning`].
pub fn decode_message(id: &str, raw: &[u8]) -> Result<DecodedMessage> {
    if raw.is_empty() {
        return Err(EmailError::Decode {
            id: id.to_string(),
            reason: "message is empty".to_string(),
        });
    }

    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| EmailError::Decode {
            id: id.to_string(),
            reason: "not a parseable RFC 5322 message".to_string(),
        })?;

    let root = convert_message(&message, 0);
    let headers = unfold_headers(&header_block_text(raw));
    let mut warnings = Vec::new();

    let subject = match get_header(&headers, "subject") {
        Some(raw_subject) => collect(decode_header(raw_subject), &mut warnings),
        None => String::new(),
    };
    let from = get_header(&headers, "from").map(|v| collect(decode_header(v), &mut warnings));
    let to = get_header(&headers, "to").map(|v| collect(decode_header(v), &mut warnings));
    let date = get_header(&headers, "date").map(str::to_string);

    let body = collect(plain_text_body(&root), &mut warnings);

    for warning in &warnings {
        warn!("Message {}: {}", id, warning);
    }

    debug!(
        "Decoded message {}: subject={:?}, multipart={}",
        id,
        subject,
        root.is_multipart()
    );

    Ok(DecodedMessage {
        subject,
        from,
        to,
        date,
        body,
        root,
        warnings,
    })
}

fn collect(decoded: Decoded, warnings: &mut Vec<DecodeWarning>) -> String {
    warnings.extend(decoded.warnings);
    decoded.text
}

/// Decodes RFC 2047 encoded words in a header value.
///
/// Total: malformed words are kept verbatim, unknown charsets and invalid
/// bytes are decoded with replacement characters. Whitespace between two
/// adjacent encoded words is dropped (RFC 2047 §6.2).
pub fn decode_header(input: &str) -> Decoded {
    let mut result = String::with_capacity(input.len());
    let mut warnings = Vec::new();
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match split_encoded_word(after_start) {
            Some(word) => {
                let raw_word = &remaining[start..start + 2 + word.consumed];
                match decode_word_bytes(&word) {
                    Some(bytes) => {
                        let decoded = decode_text(&bytes, Some(word.charset));
                        result.push_str(&decoded.text);
                        warnings.extend(decoded.warnings);
                        last_was_encoded = true;
                    }
                    None => {
                        result.push_str(raw_word);
                        warnings.push(DecodeWarning::MalformedWord(raw_word.to_string()));
                        last_was_encoded = false;
                    }
                }
                remaining = &remaining[start + 2 + word.consumed..];
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    Decoded {
        text: result,
        warnings,
    }
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    text: &'a str,
    /// Bytes consumed after the leading `=?`.
    consumed: usize,
}

fn split_encoded_word(s: &str) -> Option<EncodedWord<'_>> {
    // charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.contains(char::is_whitespace) {
        return None;
    }

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let text = &rest2[..end];
    if text.contains(char::is_whitespace) {
        return None;
    }

    Some(EncodedWord {
        charset,
        encoding,
        text,
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

fn decode_word_bytes(word: &EncodedWord<'_>) -> Option<Vec<u8>> {
    match word.encoding.to_ascii_uppercase().as_str() {
        "B" => LENIENT_BASE64.decode(word.text).ok(),
        "Q" => Some(decode_q_encoding(word.text)),
        _ => None,
    }
}

/// Q-encoding (RFC 2047 §4.2): `_` is a space, `=XX` a hex byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    _ => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }

    result
}

/// Decodes bytes in the given charset, defaulting to UTF-8.
///
/// An RFC 2231 language suffix (`utf-8*en`) is ignored.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> Decoded {
    let label = charset
        .map(|c| c.split('*').next().unwrap_or("").trim())
        .filter(|c| !c.is_empty())
        .unwrap_or("utf-8");

    let mut warnings = Vec::new();
    let text = match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if had_errors {
                warnings.push(DecodeWarning::InvalidBytes(label.to_string()));
            }
            text.into_owned()
        }
        None => {
            warnings.push(DecodeWarning::UnsupportedCharset(label.to_string()));
            String::from_utf8_lossy(bytes).into_owned()
        }
    };

    Decoded { text, warnings }
}

/// The plain-text body of a message.
///
/// A flat message decodes its only payload. A multipart message uses the
/// first `text/plain` leaf in depth-first order, or nothing.
pub fn plain_text_body(root: &MimePart) -> Decoded {
    let leaf = match root {
        MimePart::Leaf(leaf) => Some(leaf),
        MimePart::Container { .. } => root
            .leaves()
            .into_iter()
            .find(|leaf| leaf.content_type == DEFAULT_CONTENT_TYPE),
    };

    match leaf {
        Some(leaf) => decode_text(&leaf.body, leaf.charset.as_deref()),
        None => Decoded::default(),
    }
}

/// Decoded filename of a leaf that qualifies as an attachment.
///
/// A part qualifies when it has a disposition header and a non-empty filename.
pub fn attachment_filename(leaf: &LeafPart) -> Option<String> {
    leaf.disposition.as_ref()?;
    let raw = leaf.filename.as_deref()?;
    let decoded = decode_header(raw);
    for warning in &decoded.warnings {
        warn!("Attachment filename {:?}: {}", raw, warning);
    }

    let name = decoded.text.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// True at the first qualifying attachment, without copying any payload.
pub fn has_attachment(root: &MimePart) -> bool {
    root.leaves()
        .into_iter()
        .any(|leaf| attachment_filename(leaf).is_some())
}

/// All attachments in depth-first order.
pub fn extract_attachments(root: &MimePart) -> Vec<AttachmentRecord> {
    root.leaves()
        .into_iter()
        .filter_map(|leaf| {
            let filename = attachment_filename(leaf)?;
            debug!(
                "Found attachment: {} ({}, {} bytes)",
                filename,
                leaf.content_type,
                leaf.body.len()
            );
            Some(AttachmentRecord {
                filename,
                content_type: leaf.content_type.clone(),
                data: leaf.body.clone(),
            })
        })
        .collect()
}

fn convert_message(message: &Message<'_>, depth: usize) -> MimePart {
    match message.parts.first() {
        Some(root) => convert_part(message, root, depth),
        None => MimePart::Leaf(LeafPart {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            charset: None,
            disposition: None,
            filename: None,
            body: Vec::new(),
        }),
    }
}

fn convert_part(message: &Message<'_>, part: &MessagePart<'_>, depth: usize) -> MimePart {
    let content_type = part_content_type(part);

    let children = match &part.body {
        PartType::Multipart(ids) if depth < MAX_DEPTH => ids
            .iter()
            .filter_map(|id| message.parts.get(*id as usize))
            .map(|child| convert_part(message, child, depth + 1))
            .collect(),
        // A forwarded message/rfc822: its parts belong to the walk.
        PartType::Message(inner) if depth < MAX_DEPTH => vec![convert_message(inner, depth + 1)],
        PartType::Multipart(_) | PartType::Message(_) => {
            warn!("MIME nesting deeper than {} levels, truncating", MAX_DEPTH);
            Vec::new()
        }
        _ => return MimePart::Leaf(convert_leaf(message, part, content_type)),
    };

    MimePart::Container {
        content_type,
        children,
    }
}

fn convert_leaf(message: &Message<'_>, part: &MessagePart<'_>, content_type: String) -> LeafPart {
    let disposition = part
        .content_disposition()
        .map(|d| d.ctype().to_ascii_lowercase());
    let filename = part.attachment_name().map(str::to_string);
    let declared_charset = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .map(str::to_string);

    let is_text = matches!(part.body, PartType::Text(_) | PartType::Html(_));
    let is_attachment = disposition.is_some() && filename.is_some();

    // The parser hands text back already converted to UTF-8. Attachments must
    // be saved as sent, so those are rebuilt from the raw part instead.
    let (charset, body) = match (is_text, is_attachment) {
        (true, true) => match raw_part_body(message, part) {
            Some(bytes) => (declared_charset, bytes),
            None => (None, part.contents().to_vec()),
        },
        (true, false) => (None, part.contents().to_vec()),
        (false, _) => (declared_charset, part.contents().to_vec()),
    };

    LeafPart {
        content_type,
        charset,
        disposition,
        filename,
        body,
    }
}

/// Payload of `part` with only the transfer encoding undone.
fn raw_part_body(message: &Message<'_>, part: &MessagePart<'_>) -> Option<Vec<u8>> {
    let start = part.raw_body_offset() as usize;
    let end = part.raw_end_offset() as usize;
    let raw = message.raw_message().get(start..end)?;

    let encoding = part
        .content_transfer_encoding()
        .map(|e| e.trim().to_ascii_lowercase());
    match encoding.as_deref() {
        Some("base64") => {
            let compact: Vec<u8> = raw
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            LENIENT_BASE64.decode(compact).ok()
        }
        Some("quoted-printable") => Some(decode_quoted_printable(raw)),
        _ => Some(raw.to_vec()),
    }
}

/// Quoted-printable body (RFC 2045 §6.7): `=XX` is a byte, `=` at line end a soft break.
fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] != b'=' {
            result.push(input[i]);
            i += 1;
            continue;
        }

        match input.get(i + 1..i + 3) {
            Some(b"\r\n") => i += 3,
            Some([b'\n', _]) => i += 2,
            Some(hex) => match std::str::from_utf8(hex)
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                Some(byte) => {
                    result.push(byte);
                    i += 3;
                }
                None => {
                    result.push(b'=');
                    i += 1;
                }
            },
            None if input.get(i + 1) == Some(&b'\n') => i += 2,
            None => {
                result.push(b'=');
                i += 1;
            }
        }
    }

    result
}

fn part_content_type(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
            None => ct.ctype().to_string(),
        })
        .map(|ct| ct.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Header block of a raw message as text: UTF-8 when valid, Windows-1252 otherwise.
fn header_block_text(raw: &[u8]) -> Cow<'_, str> {
    let end = find_subslice(raw, b"\r\n\r\n")
        .or_else(|| find_subslice(raw, b"\n\n"))
        .unwrap_or(raw.len());
    let block = &raw[..end];

    match std::str::from_utf8(block) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => encoding_rs::WINDOWS_1252.decode_without_bom_handling(block).0,
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Joins folded continuation lines into `(lowercase_name, raw_value)` pairs.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = headers.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon) = line.find(':') {
            let name = line[..colon].trim().to_ascii_lowercase();
            let value = line[colon + 1..].trim().to_string();
            headers.push((name, value));
        }
    }

    headers
}

fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
