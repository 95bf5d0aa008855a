use std::cmp::Ordering;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// A growable byte string.
///
/// HTTP data is not guaranteed to be valid UTF-8 (and traffic inspection
/// code has to cope with the invalid cases anyway), so headers, URIs and
/// other wire values are kept as raw bytes rather than `String`. `Bstr` is a
/// thin `Vec<u8>` wrapper with the handful of comparison and mutation
/// helpers the parser needs, plus a couple of case-insensitive comparisons
/// that also treat embedded NUL bytes as wildcards (servers differ on
/// whether a NUL terminates a header value, so callers that need to match
/// "the same" header name regardless end up wanting this).
#[derive(Clone, Default)]
pub struct Bstr(Vec<u8>);

impl Bstr {
    /// Creates a new, empty `Bstr`.
    pub fn new() -> Self {
        Bstr(Vec::new())
    }

    /// Creates a new, empty `Bstr` with at least the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Bstr(Vec::with_capacity(capacity))
    }

    /// Returns the bytes as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns the bytes as a mutable slice.
    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Number of bytes stored.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no bytes stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Empties the string without changing its capacity.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Appends the given bytes to the end of this string.
    pub fn add<B: AsRef<[u8]>>(&mut self, data: B) {
        self.0.extend_from_slice(data.as_ref());
    }

    /// Appends the given bytes to the end of this string. Alias for [`Bstr::add`]
    /// kept because both spellings show up across the codebase depending on
    /// whether the call site is thinking "string" or "buffer".
    pub fn extend_from_slice<B: AsRef<[u8]>>(&mut self, data: B) {
        self.add(data);
    }

    /// Lowercases the ASCII letters in this string in place. Non-ASCII bytes
    /// are left untouched, since we don't know their encoding.
    pub fn make_ascii_lowercase(&mut self) {
        self.0.make_ascii_lowercase();
    }

    /// Compares this string to another byte sequence, honoring case.
    pub fn cmp<B: AsRef<[u8]>>(&self, other: B) -> Ordering {
        self.0.as_slice().cmp(other.as_ref())
    }

    /// Compares this string to another byte sequence, ignoring ASCII case.
    pub fn cmp_nocase<B: AsRef<[u8]>>(&self, other: B) -> Ordering {
        cmp_nocase(&self.0, other.as_ref())
    }

    /// Compares this string to another byte sequence, ignoring ASCII case and
    /// treating embedded NUL bytes as though they were not there.
    ///
    /// Some servers silently drop NUL bytes from header names before
    /// matching them; this lets a lookup match either form.
    pub fn cmp_nocase_nozero<B: AsRef<[u8]>>(&self, other: B) -> Ordering {
        let a = self.0.iter().copied().filter(|&b| b != 0);
        let b = other.as_ref().iter().copied().filter(|&b| b != 0);
        a.map(|c| c.to_ascii_lowercase())
            .cmp(b.map(|c| c.to_ascii_lowercase()))
    }

    /// True if this string equals `other`, ignoring ASCII case.
    pub fn eq_nocase<B: AsRef<[u8]>>(&self, other: B) -> bool {
        self.cmp_nocase(other) == Ordering::Equal
    }

    /// True if this string starts with `prefix`, ignoring ASCII case.
    pub fn starts_with_nocase<B: AsRef<[u8]>>(&self, prefix: B) -> bool {
        let prefix = prefix.as_ref();
        if prefix.len() > self.0.len() {
            return false;
        }
        cmp_nocase(&self.0[..prefix.len()], prefix) == Ordering::Equal
    }
}

fn cmp_nocase(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.iter().map(|c| c.to_ascii_lowercase()))
}

impl Deref for Bstr {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for Bstr {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl AsRef<[u8]> for Bstr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Bstr {
    fn from(s: &str) -> Self {
        Bstr(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Bstr {
    fn from(s: &[u8]) -> Self {
        Bstr(s.to_vec())
    }
}

impl From<Vec<u8>> for Bstr {
    fn from(v: Vec<u8>) -> Self {
        Bstr(v)
    }
}

impl PartialEq for Bstr {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Bstr {}

impl PartialEq<&str> for Bstr {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<[u8]> for Bstr {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}

impl fmt::Debug for Bstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Bstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn equality_and_case() {
        let a = Bstr::from("Content-Type");
        assert_eq!(a.cmp_nocase("content-type"), Ordering::Equal);
        assert_ne!(a.cmp("content-type"), Ordering::Equal);
        assert!(a.eq_nocase("CONTENT-TYPE"));
    }

    #[test]
    fn nocase_nozero_ignores_embedded_nul() {
        let a = Bstr::from(&b"K\x00\x00ey1"[..]);
        assert_eq!(a.cmp_nocase_nozero(b"key1".as_ref()), Ordering::Equal);
    }

    #[test]
    fn append_and_clear() {
        let mut s = Bstr::from("foo");
        s.add(b"bar".as_ref());
        assert_eq!(s.as_slice(), b"foobar");
        s.clear();
        assert!(s.is_empty());
    }

    #[test]
    fn starts_with_nocase() {
        let s = Bstr::from("Basic dXNlcjpwYXNz");
        assert!(s.starts_with_nocase("basic"));
        assert!(!s.starts_with_nocase("digest"));
    }
}
