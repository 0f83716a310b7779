use crate::Headers;

/// A resolved destination and the headers to attach to it.
///
/// Built fresh for every outbound send since reply-to and provenance vary
/// per message.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub headers: Headers,
}

impl Target {
    pub fn new(name: impl Into<String>, headers: Headers) -> Self {
        Self {
            name: name.into(),
            headers,
        }
    }

    /// Same headers, different destination subject
    pub fn redirect(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: self.headers.clone(),
        }
    }
}
