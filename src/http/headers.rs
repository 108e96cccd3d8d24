//! Header multimap.

use std::str::FromStr;

use tokio::io::AsyncBufRead;

use crate::http::{read_line, HttpError};

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    /// Name as first seen, used when writing.
    name: String,
    values: Vec<String>,
}

/// Insertion-ordered header multimap.
///
/// Lookups are ASCII case-insensitive and treat `_` like `-`, so
/// `content_length`, `Content-Length` and `CONTENT-LENGTH` are one header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    entries: Vec<HeaderEntry>,
}

fn same_name(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes().zip(b.bytes()).all(|(x, y)| {
            let norm = |c: u8| if c == b'_' { b'-' } else { c.to_ascii_lowercase() };
            norm(x) == norm(y)
        })
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, name: &str) -> Option<&HeaderEntry> {
        self.entries.iter().find(|e| same_name(&e.name, name))
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entry(name)
            .and_then(|e| e.values.first())
            .map(String::as_str)
    }

    /// Every value of `name`, in arrival order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entry(name).map(|e| e.values.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Append a value, keeping earlier ones.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        match self.entries.iter_mut().find(|e| same_name(&e.name, name)) {
            Some(entry) => entry.values.push(value.into()),
            None => self.entries.push(HeaderEntry {
                name: name.to_string(),
                values: vec![value.into()],
            }),
        }
    }

    /// Replace every value of `name`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.entries.iter_mut().find(|e| same_name(&e.name, name)) {
            Some(entry) => entry.values = vec![value.into()],
            None => self.add(name, value),
        }
    }

    pub fn remove(&mut self, name: &str) -> Vec<String> {
        match self.entries.iter().position(|e| same_name(&e.name, name)) {
            Some(index) => self.entries.remove(index).values,
            None => Vec::new(),
        }
    }

    /// Parse the first value of `name`; a malformed value is a bad request.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, HttpError> {
        self.get(name)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| HttpError::bad_request(format!("invalid {name} header '{value}'")))
            })
            .transpose()
    }

    pub fn content_length(&self) -> Result<Option<u64>, HttpError> {
        self.parse("Content-Length")
    }

    /// `(name, value)` pairs in the order headers were first added.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|e| e.values.iter().map(move |v| (e.name.as_str(), v.as_str())))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read header lines up to and including the blank line.
    pub(crate) async fn read_from<R>(reader: &mut R, max_line: usize) -> Result<Self, HttpError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut headers = HttpHeaders::new();
        loop {
            let line = read_line(reader, max_line)
                .await?
                .ok_or_else(|| HttpError::bad_request("missing blank line after headers"))?;
            if line.is_empty() {
                return Ok(headers);
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::bad_request(format!("malformed header line '{line}'")))?;
            if name.is_empty() || name.contains(|c: char| c.is_ascii_whitespace()) {
                return Err(HttpError::bad_request(format!("malformed header name '{name}'")));
            }
            headers.add(name, value.trim());
        }
    }
}
