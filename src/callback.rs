//! Query-string handling for the implicit-grant round trip
//!
//! Outbound: the authorization URL query. Inbound: the fragment or query
//! string the provider appends to the redirect URI, e.g.
//! `#access_token=abc&scope=chat%3Aread+chat%3Aedit&state=xyz&token_type=bearer`.
//!
//! Both directions use `application/x-www-form-urlencoded` rules, which is
//! what browsers apply to URL search parameters.

/// Parameters the provider hands back on the redirect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Bearer token, present on success
    pub access_token: Option<String>,
    /// Echo of the `state` sent with the authorization request
    pub state: Option<String>,
    /// Usually `bearer`
    pub token_type: Option<String>,
    /// Granted scopes, space separated
    pub scope: Option<String>,
    /// Provider error code, present when the user denied access
    pub error: Option<String>,
    /// Human-readable companion to `error`
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a raw callback string
    ///
    /// A single leading `#` or `?` is ignored so the string can be taken
    /// straight off a location. For repeated keys the first one wins.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw
            .strip_prefix('#')
            .or_else(|| raw.strip_prefix('?'))
            .unwrap_or(raw);

        let mut params = Self::default();
        for (key, value) in parse_query(raw) {
            let slot = match key.as_str() {
                "access_token" => &mut params.access_token,
                "state" => &mut params.state,
                "token_type" => &mut params.token_type,
                "scope" => &mut params.scope,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }

    /// Non-empty access token, if any
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Split a form-urlencoded string into decoded key/value pairs
///
/// Empty segments are skipped; a segment without `=` yields an empty value.
#[must_use]
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            (form_urldecode(key), form_urldecode(value))
        })
        .collect()
}

/// Join key/value pairs into a form-urlencoded query string
#[must_use]
pub fn build_query(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", form_urlencode(k), form_urlencode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encode a string for a form-urlencoded query.
/// Space becomes `+`; only `*-._` and alphanumerics pass through.
#[must_use]
pub fn form_urlencode(s: &str) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'*' | b'-' | b'.' | b'_' => {
                result.push(byte as char);
            }
            b' ' => result.push('+'),
            _ => {
                // Writing to a String cannot fail
                let _ = write!(result, "%{byte:02X}");
            }
        }
    }
    result
}

/// Decode a form-urlencoded component.
/// Malformed `%` escapes are kept literally; invalid UTF-8 is replaced.
#[must_use]
pub fn form_urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                if let Some(byte) = hex {
                    out.push(byte);
                    i += 2;
                } else {
                    out.push(b'%');
                }
            }
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
