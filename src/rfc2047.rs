//! RFC 2047 encoded-words: encoding non-ASCII header text and decoding it back.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::warn;

/// Maximum number of UTF-8 bytes carried by one encoded-word.
///
/// 45 bytes become 60 base64 characters, which with the `=?utf-8?b?` / `?=`
/// wrapper keeps every word under the 75-character limit of RFC 2047 §2.
const MAX_WORD_BYTES: usize = 45;

/// Encode `text` as one or more `=?utf-8?b?…?=` words separated by spaces.
///
/// Words never split a UTF-8 sequence.
pub fn encode(text: &str) -> String {
    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;

    for (idx, ch) in text.char_indices() {
        let next = idx + ch.len_utf8();
        if next - start > MAX_WORD_BYTES && end > start {
            words.push(encode_word(&text[start..end]));
            start = end;
        }
        end = next;
    }
    if end > start {
        words.push(encode_word(&text[start..end]));
    }

    words.join(" ")
}

fn encode_word(chunk: &str) -> String {
    format!("=?utf-8?b?{}?=", BASE64.encode(chunk.as_bytes()))
}

/// Encode `text` only when it contains non-ASCII characters.
pub fn encode_if_needed(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(encode(text))
    }
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded-words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &remaining[start + 2 + decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed after the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => BASE64.decode(encoded_text.trim().as_bytes()).ok()?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed,
    })
}

/// Decode Q-encoding: underscores become spaces, `=XX` becomes a byte.
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
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    Err(_) => {
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

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        None => {
            warn!(charset, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
