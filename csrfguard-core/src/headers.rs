//! Multi-valued, case-insensitive header storage.
//!
//! Headers are kept in insertion order in a `SmallVec`. A request or
//! response rarely carries more than a dozen headers, so lookups are a
//! linear scan over inline storage. Repeated names are allowed, which is
//! what `Set-Cookie` needs.

use smallvec::SmallVec;
use std::fmt;

/// Headers stored inline before spilling to the heap.
pub const INLINE_HEADERS: usize = 12;

#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    #[inline]
    pub fn name_eq(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Ordered header list with case-insensitive lookup.
///
/// ```rust
/// use csrfguard_core::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("Content-Type", "text/html; charset=utf-8");
/// headers.append("Set-Cookie", "a=1; Path=/");
/// headers.append("Set-Cookie", "b=2; Path=/");
///
/// assert_eq!(headers.media_type().as_deref(), Some("text/html"));
/// assert_eq!(headers.get_all("set-cookie").len(), 2);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    inner: SmallVec<[Header; INLINE_HEADERS]>,
}

impl HeaderMap {
    pub const fn new() -> Self {
        Self {
            inner: SmallVec::new_const(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// First value for `name`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|h| h.name_eq(name))
            .map(|h| h.value.as_str())
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|h| h.name_eq(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|h| h.name_eq(name))
    }

    /// Replace the first header named `name` and drop any duplicates.
    ///
    /// Returns the previous first value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();

        match self.inner.iter().position(|h| h.name_eq(&name)) {
            Some(pos) => {
                let old = std::mem::replace(&mut self.inner[pos].value, value);
                let mut idx = pos + 1;
                while idx < self.inner.len() {
                    if self.inner[idx].name_eq(&name) {
                        self.inner.remove(idx);
                    } else {
                        idx += 1;
                    }
                }
                Some(old)
            }
            None => {
                self.inner.push(Header { name, value });
                None
            }
        }
    }

    /// Add a header without touching existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push(Header::new(name, value));
    }

    /// Remove every header named `name`, returning the first value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let first = self.get(name).map(str::to_owned);
        self.inner.retain(|h| !h.name_eq(name));
        first
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|h| (h.name.as_str(), h.value.as_str()))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("Content-Type")
    }

    /// Lowercased media type without parameters, e.g. `text/html`.
    pub fn media_type(&self) -> Option<String> {
        self.content_type().map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Raw `Content-Length` value, if present.
    pub fn content_length_raw(&self) -> Option<&str> {
        self.get("Content-Length")
    }

    /// Parsed `Content-Length`; `None` if absent or not a number.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length_raw()?.trim().parse().ok()
    }

    pub fn set_content_length(&mut self, len: u64) {
        self.insert("Content-Length", len.to_string());
    }

    pub fn set_content_type(&mut self, value: impl Into<String>) {
        self.insert("Content-Type", value);
    }

    /// `Host` header with any port removed.
    pub fn host(&self) -> Option<&str> {
        let host = self.get("Host")?.trim();
        Some(strip_port(host))
    }

    /// Value of the cookie `name` across all `Cookie` headers.
    ///
    /// The first matching pair wins, as browsers send the most specific
    /// cookie first.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.get_all("Cookie")
            .into_iter()
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().trim_matches('"'))
    }
}

fn strip_port(host: &str) -> &str {
    // IPv6 literal: keep the brackets, drop the port after them.
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.inner.iter().map(|h| (&h.name, &h.value)))
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.append(k, v);
        }
        map
    }
}
