//! Email address rendering for `From:` and `To:` headers (RFC 5322 §3.4).

use crate::rfc2047;

/// Characters that force a display name into a quoted-string.
/// `.` is left out so `J. Doe` stays unquoted.
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '"'];

/// A display name and address pair.
///
/// # Examples
/// - `("Juan García", "juan@ejemplo.com")` → `=?utf-8?b?SnVhbiBHYXJjw61h?= <juan@ejemplo.com>`
/// - `("", "user@example.com")` → `user@example.com`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }

    /// Render as an ASCII-only header value.
    pub fn to_header_value(&self) -> String {
        format_address(&self.address, &self.display_name)
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

/// Format an address with an optional display name.
///
/// - empty address → empty string
/// - blank name → bare address
/// - ASCII name → `Name <address>` (quoted if it contains specials)
/// - non-ASCII name → encoded-word followed by `<address>`
pub fn format_address(address: &str, name: &str) -> String {
    let address = address.trim();
    if address.is_empty() {
        return String::new();
    }

    let name = name.trim();
    if name.is_empty() {
        return address.to_string();
    }

    if !name.is_ascii() {
        return format!("{} <{address}>", rfc2047::encode(name));
    }

    if name.contains(SPECIALS) {
        format!("\"{}\" <{address}>", escape_quoted(name))
    } else {
        format!("{name} <{address}>")
    }
}

fn escape_quoted(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    for ch in name.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
