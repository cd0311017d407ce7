//! Error types for probing operations

use thiserror::Error;

/// Errors that can occur while setting up or running probes
///
/// # Examples
///
/// ```
/// # use perfpinger::PingerError;
/// fn handle_error(err: PingerError) {
///     match err {
///         PingerError::InsufficientPermissions { required, suggestion } => {
///             eprintln!("Insufficient permissions: {}", required);
///             eprintln!("Try: {}", suggestion);
///         }
///         PingerError::ResolutionError(msg) => {
///             eprintln!("DNS resolution failed: {}", msg);
///         }
///         _ => eprintln!("perfpinger failed: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum PingerError {
    /// Socket creation failed due to insufficient permissions
    #[error("Insufficient permissions: {required}")]
    InsufficientPermissions {
        /// Description of required permissions (e.g., "root or CAP_NET_RAW")
        required: String,
        /// Suggested remedy
        suggestion: String,
    },

    /// Socket creation failed for other reasons
    #[error("Failed to create socket: {0}")]
    SocketError(String),

    /// A host could not be resolved to an IPv4 address
    #[error("Failed to resolve host: {0}")]
    ResolutionError(String),

    /// The host list could not be read
    #[error("Failed to read host file {path}: {reason}")]
    HostFileError {
        /// Path that was being read
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Failed to send a probe packet
    ///
    /// Fatal for the session that hit it.
    #[error("Failed to send probe: {0}")]
    ProbeSendError(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Feature not available on this platform
    #[error("{feature} is not yet implemented")]
    NotImplemented {
        /// Description of the unavailable feature
        feature: String,
    },

    /// IPv6 targets are not supported
    #[error("IPv6 targets are not supported")]
    Ipv6NotSupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PingerError::InsufficientPermissions {
            required: "root".to_string(),
            suggestion: "sudo".to_string(),
        };
        assert_eq!(err.to_string(), "Insufficient permissions: root");

        let err = PingerError::HostFileError {
            path: "hosts.txt".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to read host file hosts.txt: not found"
        );

        assert_eq!(
            PingerError::Ipv6NotSupported.to_string(),
            "IPv6 targets are not supported"
        );
    }
}
