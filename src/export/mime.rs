//! Serialize an [`OutputRecord`] as RFC 5322 / MIME bytes.
//!
//! Output uses LF line endings, as mbox files do. Text parts that are
//! plain ASCII with short lines go out as `7bit`; everything else,
//! including all attachments, is base64 with 76-character lines.
//! Multipart boundaries are derived from a hash of the content, so the same
//! record always serializes to the same bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::model::record::{AttachmentPart, MimeLayout, OutputRecord};
use crate::rfc2047;

/// Preferred maximum header line length (RFC 5322 §2.1.1).
const FOLD_WIDTH: usize = 78;

/// Hard limit on body line length for `7bit` content.
const MAX_7BIT_LINE: usize = 998;

/// Base64 line length (RFC 2045 §6.8).
const BASE64_LINE: usize = 76;

/// Render the whole message: top-level headers, MIME headers, body.
pub fn render_message(record: &OutputRecord) -> String {
    let mut out = String::new();
    for header in &record.headers {
        push_header(&mut out, header.name, &header.value);
    }
    push_header(&mut out, "MIME-Version", "1.0");
    write_part(&mut out, &record.body, 0);
    out
}

fn write_part(out: &mut String, layout: &MimeLayout, depth: usize) {
    match layout {
        MimeLayout::Plain(text) => write_text_part(out, "plain", text),
        MimeLayout::Html(text) => write_text_part(out, "html", text),
        MimeLayout::Alternative { plain, html } => {
            let boundary = boundary_for(layout, depth);
            write_multipart_header(out, "alternative", &boundary);
            out.push_str(&format!("--{boundary}\n"));
            write_text_part(out, "plain", plain);
            out.push_str(&format!("--{boundary}\n"));
            write_text_part(out, "html", html);
            out.push_str(&format!("--{boundary}--\n"));
        }
        MimeLayout::Mixed { body, attachments } => {
            let boundary = boundary_for(layout, depth);
            write_multipart_header(out, "mixed", &boundary);
            out.push_str(&format!("--{boundary}\n"));
            write_part(out, body, depth + 1);
            for attachment in attachments {
                out.push_str(&format!("--{boundary}\n"));
                write_attachment_part(out, attachment);
            }
            out.push_str(&format!("--{boundary}--\n"));
        }
    }
}

fn write_multipart_header(out: &mut String, subtype: &str, boundary: &str) {
    push_header(
        out,
        "Content-Type",
        &format!("multipart/{subtype}; boundary=\"{boundary}\""),
    );
    out.push('\n');
}

fn write_text_part(out: &mut String, subtype: &str, text: &str) {
    push_header(
        out,
        "Content-Type",
        &format!("text/{subtype}; charset=\"utf-8\""),
    );
    if is_7bit_safe(text) {
        push_header(out, "Content-Transfer-Encoding", "7bit");
        out.push('\n');
        for line in text.lines() {
            out.push_str(line);
            out.push('\n');
        }
    } else {
        push_header(out, "Content-Transfer-Encoding", "base64");
        out.push('\n');
        push_base64(out, text.as_bytes());
    }
}

fn write_attachment_part(out: &mut String, attachment: &AttachmentPart) {
    push_header(out, "Content-Type", "application/octet-stream");
    push_header(out, "Content-Transfer-Encoding", "base64");
    push_header(
        out,
        "Content-Disposition",
        &format!("attachment; filename=\"{}\"", filename_param(&attachment.filename)),
    );
    out.push('\n');
    push_base64(out, &attachment.data);
}

/// Quote-safe, ASCII-only filename parameter.
fn filename_param(filename: &str) -> String {
    let single_line: String = filename
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    if !single_line.is_ascii() {
        return rfc2047::encode(&single_line);
    }
    single_line.replace('\\', "\\\\").replace('"', "\\\"")
}

fn is_7bit_safe(text: &str) -> bool {
    text.is_ascii()
        && !text.contains('\0')
        && text.lines().all(|line| line.len() <= MAX_7BIT_LINE && !line.contains('\r'))
}

fn push_base64(out: &mut String, data: &[u8]) {
    let encoded = BASE64.encode(data);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        // base64 output is ASCII, so every chunk is valid UTF-8
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
}

/// Append `Name: value`, folding at spaces to keep lines near 78 characters.
fn push_header(out: &mut String, name: &str, value: &str) {
    let mut line_len = name.len() + 1;
    out.push_str(name);
    out.push(':');

    for (i, word) in value.split(' ').enumerate() {
        if i > 0 && line_len + 1 + word.len() > FOLD_WIDTH && line_len > name.len() + 1 {
            out.push('\n');
            line_len = 0;
        }
        out.push(' ');
        out.push_str(word);
        line_len += 1 + word.len();
    }
    out.push('\n');
}

/// Boundary derived from the part's content and nesting depth.
fn boundary_for(layout: &MimeLayout, depth: usize) -> String {
    let mut hasher = Sha256::new();
    hash_layout(&mut hasher, layout);
    let digest = hasher.finalize();
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("=_pst2mbox_{depth}_{hex}")
}

fn hash_layout(hasher: &mut Sha256, layout: &MimeLayout) {
    match layout {
        MimeLayout::Plain(text) | MimeLayout::Html(text) => hasher.update(text.as_bytes()),
        MimeLayout::Alternative { plain, html } => {
            hasher.update(plain.as_bytes());
            hasher.update([0u8]);
            hasher.update(html.as_bytes());
        }
        MimeLayout::Mixed { body, attachments } => {
            hash_layout(hasher, body);
            for attachment in attachments {
                hasher.update([0u8]);
                hasher.update(attachment.filename.as_bytes());
                hasher.update(&attachment.data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::Header;

    fn record(body: MimeLayout) -> OutputRecord {
        OutputRecord {
            headers: vec![Header {
                name: "Subject",
                value: "Test".to_string(),
            }],
            body,
            envelope: None,
        }
    }

    #[test]
    fn test_plain_ascii_is_7bit() {
        let out = render_message(&record(MimeLayout::Plain("hello\nworld".to_string())));
        assert!(out.starts_with("Subject: Test\nMIME-Version: 1.0\n"));
        assert!(out.contains("Content-Type: text/plain; charset=\"utf-8\"\n"));
        assert!(out.contains("Content-Transfer-Encoding: 7bit\n\nhello\nworld\n"));
    }

    #[test]
    fn test_non_ascii_body_is_base64() {
        let out = render_message(&record(MimeLayout::Plain("¡Hola!".to_string())));
        assert!(out.contains("Content-Transfer-Encoding: base64\n\n"));
        assert!(out.contains(&BASE64.encode("¡Hola!")));
        assert!(out.is_ascii());
    }

    #[test]
    fn test_alternative_order() {
        let out = render_message(&record(MimeLayout::Alternative {
            plain: "plain".to_string(),
            html: "<p>html</p>".to_string(),
        }));
        let plain_at = out.find("text/plain").unwrap();
        let html_at = out.find("text/html").unwrap();
        assert!(out.contains("multipart/alternative; boundary="));
        assert!(plain_at < html_at);
    }

    #[test]
    fn test_attachment_part() {
        let out = render_message(&record(MimeLayout::Mixed {
            body: Box::new(MimeLayout::Plain("see attached".to_string())),
            attachments: vec![AttachmentPart {
                filename: "report \"final\".pdf".to_string(),
                data: b"%PDF-1.4".to_vec(),
            }],
        }));
        assert!(out.contains("Content-Type: application/octet-stream\n"));
        assert!(out.contains("filename=\"report \\\"final\\\".pdf\""));
        assert!(out.contains(&BASE64.encode(b"%PDF-1.4")));
    }

    #[test]
    fn test_non_ascii_filename_is_encoded() {
        assert!(filename_param("résumé.pdf").starts_with("=?utf-8?b?"));
        assert_eq!(filename_param("a\nb.txt"), "a b.txt");
    }

    #[test]
    fn test_boundaries_are_deterministic_and_nested_distinct() {
        let layout = MimeLayout::Mixed {
            body: Box::new(MimeLayout::Alternative {
                plain: "p".to_string(),
                html: "h".to_string(),
            }),
            attachments: vec![AttachmentPart {
                filename: "a".to_string(),
                data: vec![1],
            }],
        };
        let first = render_message(&record(layout.clone()));
        let second = render_message(&record(layout));
        assert_eq!(first, second);
        assert!(first.contains("=_pst2mbox_0_"));
        assert!(first.contains("=_pst2mbox_1_"));
    }

    #[test]
    fn test_long_header_is_folded() {
        let mut out = String::new();
        let value = vec!["word"; 40].join(" ");
        push_header(&mut out, "Subject", &value);
        for line in out.lines() {
            assert!(line.len() <= FOLD_WIDTH, "line too long: {line}");
        }
        let unfolded = out.replace("\n ", " ");
        assert_eq!(unfolded, format!("Subject: {value}\n"));
    }

    #[test]
    fn test_base64_lines_are_wrapped() {
        let mut out = String::new();
        push_base64(&mut out, &[0u8; 200]);
        assert!(out.lines().all(|l| l.len() <= BASE64_LINE));
    }
}
