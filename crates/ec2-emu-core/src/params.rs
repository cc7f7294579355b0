//! Raw request parameters: the flat, form-encoded key/value bag of one request.
//!
//! Keys keep the order in which they first appeared in the request body, and
//! every key maps to the ordered list of values supplied for it. Nothing in
//! the crate mutates a `RawParameters` after it has been built.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{Ec2Error, Result};

/// Flat parameter bag of a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParameters {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl RawParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` body or query string.
    ///
    /// `+` decodes to a space and `%XX` escapes are decoded as UTF-8. A
    /// segment without `=` is a key with an empty value; empty segments are
    /// skipped. Repeated keys accumulate values in order.
    pub fn parse(body: &str) -> Result<Self> {
        let mut params = Self::new();
        for segment in body.trim().split('&') {
            if segment.is_empty() {
                continue;
            }
            let (key, value) = match segment.split_once('=') {
                Some((k, v)) => (k, v),
                None => (segment, ""),
            };
            let key = percent_decode(key)?;
            if key.is_empty() {
                return Err(Ec2Error::malformed(format!(
                    "parameter without a name: '{segment}'"
                )));
            }
            params.push(key, percent_decode(value)?);
        }
        Ok(params)
    }

    /// Append a value under `key`, creating the key if it is new.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1.push(value.into()),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, vec![value.into()]));
            }
        }
    }

    /// First value for `key`, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.all(key).first().map(String::as_str)
    }

    /// All values for `key`, empty when the key is absent.
    pub fn all(&self, key: &str) -> &[String] {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1.as_slice())
            .unwrap_or(&[])
    }

    /// Keys in request order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// `(key, values)` pairs in request order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for RawParameters {
    type Err = Ec2Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<K, V> FromIterator<(K, V)> for RawParameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}

fn percent_decode(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
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
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        Ec2Error::malformed(format!("invalid percent-escape in '{raw}'"))
                    })?;
                out.push(hex);
                i += 2;
            }
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8(out)
        .map_err(|_| Ec2Error::malformed(format!("parameter '{raw}' is not valid UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_order_and_repeats() {
        let params = RawParameters::parse("a=1&a=2&b=x%20y+z").unwrap();
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.all("a"), ["1", "2"]);
        assert_eq!(params.first("b"), Some("x y z"));
    }

    #[test]
    fn parse_key_without_value() {
        let params = RawParameters::parse("DryRun&Action=RunInstances").unwrap();
        assert_eq!(params.first("DryRun"), Some(""));
        assert_eq!(params.first("Action"), Some("RunInstances"));
    }

    #[test]
    fn parse_skips_empty_segments() {
        let params = RawParameters::parse("&&a=1&").unwrap();
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn parse_rejects_bad_escape() {
        let err = RawParameters::parse("a=%zz").unwrap_err();
        assert!(matches!(err, Ec2Error::MalformedRequest(_)));
    }

    #[test]
    fn parse_rejects_truncated_escape() {
        assert!(RawParameters::parse("a=%4").is_err());
    }

    #[test]
    fn parse_rejects_signed_escape() {
        for body in ["a=%+1", "a=%-1", "a=% 1"] {
            let err = RawParameters::parse(body).unwrap_err();
            assert!(matches!(err, Ec2Error::MalformedRequest(_)), "{body}");
        }
    }

    #[test]
    fn decodes_escaped_slashes() {
        let params = RawParameters::parse("BlockDeviceMapping.1.DeviceName=%2Fdev%2Fsda1").unwrap();
        assert_eq!(
            params.first("BlockDeviceMapping.1.DeviceName"),
            Some("/dev/sda1")
        );
    }

    #[test]
    fn absent_key_has_no_values() {
        let params = RawParameters::new();
        assert!(params.all("missing").is_empty());
        assert_eq!(params.first("missing"), None);
    }
}
