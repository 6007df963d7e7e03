//! Small enums shared by the transport and interceptors

/// Connection handling after a response is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpConnectionPolicy {
    /// Send `Connection: close` and close the socket
    Closed,
    /// Send `Connection: keep-alive` and wait for the next request
    KeepAlive,
}

impl HttpConnectionPolicy {
    /// Value for the `Connection` header
    pub fn header_value(&self) -> &'static str {
        match self {
            HttpConnectionPolicy::Closed => "close",
            HttpConnectionPolicy::KeepAlive => "keep-alive",
        }
    }
}

/// What the transport should do with the connection after an interceptor ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpInterceptorResult {
    /// Keep the connection; a response will be delivered (possibly later)
    Keep,
    /// Close the connection without a response
    Disconnect,
}

/// Whether a request handler lets the next handler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpNextHandler {
    /// Call the next handler
    Call,
    /// Do not call the next handler
    DoNotCall,
}

/// Lifecycle of a request inside an interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Request received, no interceptor has claimed it
    Idle,
    /// An interceptor's claim predicate matched
    Claimed,
    /// Handed to the worker pool
    Processing,
    /// A response has been delivered
    Responded,
    /// Dropped without a response
    Rejected,
}

impl RequestPhase {
    /// Whether the request has reached a final phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Responded | RequestPhase::Rejected)
    }

    /// Whether `next` is a legal successor of this phase
    pub fn can_transition_to(&self, next: RequestPhase) -> bool {
        use RequestPhase::*;

        matches!(
            (self, next),
            (Idle, Claimed)
                | (Idle, Responded)
                | (Idle, Rejected)
                | (Claimed, Processing)
                | (Claimed, Responded)
                | (Claimed, Rejected)
                | (Processing, Responded)
                | (Processing, Rejected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_header() {
        assert_eq!(HttpConnectionPolicy::Closed.header_value(), "close");
        assert_eq!(HttpConnectionPolicy::KeepAlive.header_value(), "keep-alive");
    }

    #[test]
    fn test_phase_transitions() {
        assert!(RequestPhase::Idle.can_transition_to(RequestPhase::Claimed));
        assert!(RequestPhase::Claimed.can_transition_to(RequestPhase::Processing));
        assert!(RequestPhase::Processing.can_transition_to(RequestPhase::Responded));
        assert!(!RequestPhase::Responded.can_transition_to(RequestPhase::Processing));
        assert!(!RequestPhase::Rejected.can_transition_to(RequestPhase::Responded));
        assert!(!RequestPhase::Processing.can_transition_to(RequestPhase::Claimed));
        assert!(RequestPhase::Rejected.is_terminal());
        assert!(!RequestPhase::Processing.is_terminal());
    }
}
