//! Maps HTTP client exceptions and response status codes onto the
//! `ErrorType` taxonomy. Pure functions, no I/O — the Executor is the only
//! caller, but these are exercised directly in the tests below.

use apisched_domain::ErrorType;

/// Classify a `reqwest::Error` raised while attempting a request.
/// Mirrors the reference's `classify_error`: timeout first, then
/// connection-family errors split on message content, then a best-effort
/// SSL/certificate sniff as the final fallback before UNKNOWN.
pub fn classify_exception(err: &reqwest::Error) -> (ErrorType, String) {
    let message = err.to_string();

    if err.is_timeout() {
        return (ErrorType::Timeout, format!("Request timed out: {message}"));
    }

    if err.is_connect() {
        let lower = message.to_lowercase();
        if lower.contains("name or service not known") || lower.contains("dns") {
            return (ErrorType::Dns, format!("DNS resolution failed: {message}"));
        }
        if lower.contains("ssl") || lower.contains("certificate") {
            return (ErrorType::Ssl, format!("SSL/TLS error: {message}"));
        }
        return (ErrorType::Connection, format!("Connection failed: {message}"));
    }

    if let Some(status) = err.status() {
        let code = status.as_u16();
        if (400..500).contains(&code) {
            return (ErrorType::ClientError, format!("Client error {code}: {message}"));
        }
        if (500..600).contains(&code) {
            return (ErrorType::ServerError, format!("Server error {code}: {message}"));
        }
    }

    let lower = message.to_lowercase();
    if lower.contains("ssl") || lower.contains("certificate") {
        return (ErrorType::Ssl, format!("SSL/TLS error: {message}"));
    }

    (ErrorType::Unknown, format!("Unknown error: {message}"))
}

/// Classify a completed HTTP response's status code.
pub fn classify_status(status_code: u16) -> ErrorType {
    if (200..400).contains(&status_code) {
        ErrorType::None
    } else if (400..500).contains(&status_code) {
        ErrorType::ClientError
    } else if (500..600).contains(&status_code) {
        ErrorType::ServerError
    } else {
        ErrorType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_status_ranges() {
        assert_eq!(classify_status(200), ErrorType::None);
        assert_eq!(classify_status(204), ErrorType::None);
        assert_eq!(classify_status(301), ErrorType::None);
        assert_eq!(classify_status(399), ErrorType::None);
        assert_eq!(classify_status(400), ErrorType::ClientError);
        assert_eq!(classify_status(404), ErrorType::ClientError);
        assert_eq!(classify_status(499), ErrorType::ClientError);
        assert_eq!(classify_status(500), ErrorType::ServerError);
        assert_eq!(classify_status(503), ErrorType::ServerError);
        assert_eq!(classify_status(599), ErrorType::ServerError);
        assert_eq!(classify_status(100), ErrorType::Unknown);
        assert_eq!(classify_status(600), ErrorType::Unknown);
    }

    #[test]
    fn error_type_retryability_matches_error_handling_design() {
        assert!(!ErrorType::None.is_retryable());
        assert!(!ErrorType::ClientError.is_retryable());
        for kind in [
            ErrorType::Timeout,
            ErrorType::Dns,
            ErrorType::Connection,
            ErrorType::Ssl,
            ErrorType::ServerError,
            ErrorType::Unknown,
        ] {
            assert!(kind.is_retryable(), "{kind:?} should be retryable");
        }
    }
}
