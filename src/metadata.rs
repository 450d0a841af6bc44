//! Call metadata: an ordered string multimap.
//!
//! Used for both the incoming request metadata and the outgoing trailer.
//! Keys are stored lower-cased; lookups are therefore case-insensitive.
//! Insertion order is preserved and a key may appear more than once.

/// An ordered `key → value` multimap with lowercase keys.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` under `key`, keeping any existing values.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into().to_ascii_lowercase(), value.into()));
    }

    /// Builder-style [`append`](Metadata::append).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(key, value);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Moves every entry of `other` to the end of `self`.
    pub fn extend(&mut self, other: Metadata) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut md = Metadata::new();
        for (k, v) in iter {
            md.append(k, v);
        }
        md
    }
}

impl IntoIterator for Metadata {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Whether `key` may be sent as trailer metadata.
///
/// Keys must be non-empty, use only `0-9 a-z - _ .`, and must not use the
/// `grpc-` prefix, which belongs to the transport.
pub(crate) fn is_valid_trailer_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with("grpc-")
        && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'-' | b'_' | b'.'))
}

/// Whether `value` may be sent as (non-binary) metadata: printable ASCII.
pub(crate) fn is_valid_value(value: &str) -> bool {
    value.bytes().all(|b| (0x20..=0x7e).contains(&b))
}
