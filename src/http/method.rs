//! HTTP request methods (RFC 7231 section 4)
//!
//! Methods are bit flags so interceptors and handlers can accept a set of
//! methods at once, e.g. `HttpMethod::GET | HttpMethod::HEAD`.

use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A single HTTP method or a set of methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HttpMethod(u16);

impl HttpMethod {
    pub const UNKNOWN: HttpMethod = HttpMethod(0x0000);
    pub const GET: HttpMethod = HttpMethod(0x0001);
    pub const HEAD: HttpMethod = HttpMethod(0x0002);
    pub const POST: HttpMethod = HttpMethod(0x0004);
    pub const PUT: HttpMethod = HttpMethod(0x0008);
    pub const DELETE: HttpMethod = HttpMethod(0x0010);
    pub const CONNECT: HttpMethod = HttpMethod(0x0020);
    pub const OPTIONS: HttpMethod = HttpMethod(0x0040);
    pub const TRACE: HttpMethod = HttpMethod(0x0080);
    pub const ALL: HttpMethod = HttpMethod(0x00FF);

    /// Parse a request-line method token. Method names are case-sensitive.
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => Self::GET,
            "HEAD" => Self::HEAD,
            "POST" => Self::POST,
            "PUT" => Self::PUT,
            "DELETE" => Self::DELETE,
            "CONNECT" => Self::CONNECT,
            "OPTIONS" => Self::OPTIONS,
            "TRACE" => Self::TRACE,
            _ => Self::UNKNOWN,
        }
    }

    /// Raw bit representation
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Whether every method in `other` is also in `self`.
    ///
    /// `UNKNOWN` is never contained in anything.
    pub fn contains(&self, other: HttpMethod) -> bool {
        other.0 != 0 && (self.0 & other.0) == other.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == 0
    }

    /// Token for a single method, `None` for sets and `UNKNOWN`
    pub fn as_str(&self) -> Option<&'static str> {
        match *self {
            Self::GET => Some("GET"),
            Self::HEAD => Some("HEAD"),
            Self::POST => Some("POST"),
            Self::PUT => Some("PUT"),
            Self::DELETE => Some("DELETE"),
            Self::CONNECT => Some("CONNECT"),
            Self::OPTIONS => Some("OPTIONS"),
            Self::TRACE => Some("TRACE"),
            _ => None,
        }
    }
}

impl BitOr for HttpMethod {
    type Output = HttpMethod;

    fn bitor(self, rhs: Self) -> Self::Output {
        HttpMethod(self.0 | rhs.0)
    }
}

impl BitOrAssign for HttpMethod {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for HttpMethod {
    type Output = HttpMethod;

    fn bitand(self, rhs: Self) -> Self::Output {
        HttpMethod(self.0 & rhs.0)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_str() {
            Some(name) => f.write_str(name),
            None if self.is_unknown() => f.write_str("UNKNOWN"),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}
