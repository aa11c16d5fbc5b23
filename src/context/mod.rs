//! Per-request context: the parsed request plus the path parameters the
//! router extracted for it.

use std::collections::HashMap;

use crate::http::Request;

/// Path parameters extracted from the matched route, already percent-decoded.
///
/// ```
/// use geocache::context::Parameters;
///
/// let mut params = Parameters::new();
/// params.insert("place", "New York");
/// assert_eq!(params.get("place"), Some("New York"));
/// assert_eq!(params.get("other"), None);
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Everything a handler gets for one request.
#[derive(Debug)]
pub struct Context {
    request: Request,
    params: Parameters,
}

impl Context {
    /// Creates a context with no path parameters.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, Parameters::new())
    }

    /// Creates a context carrying the parameters of the matched route.
    pub fn with_params(request: Request, params: Parameters) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Shorthand for `self.params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}
