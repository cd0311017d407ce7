//! Factory for creating echo transports with automatic fallback

use super::{EchoTransport, SocketMode};
use crate::pinger::PingerError;
use crate::probe::Target;

/// Create the transport for one target
///
/// Without a preferred mode, a raw socket is tried first and a datagram
/// socket second. Datagram sockets on Linux are bound to the target's echo
/// identifier, because the kernel rewrites the identifier to the bound port.
pub fn create_echo_transport(
    target: &Target,
    preferred_mode: Option<SocketMode>,
) -> Result<Box<dyn EchoTransport>, PingerError> {
    platform::create_echo_transport(target, preferred_mode)
}

#[cfg(unix)]
mod platform {
    use super::super::icmp_v4::IcmpV4Transport;
    use super::super::utils::sudo_hint;
    use super::super::{EchoTransport, SocketMode};
    use crate::pinger::PingerError;
    use crate::probe::Target;
    use socket2::{Domain, Protocol, Socket, Type};
    use std::net::{Ipv4Addr, SocketAddrV4};
    use tracing::{debug, info};

    // Common POSIX error codes
    const EPERM: i32 = 1; // Operation not permitted
    const EACCES: i32 = 13; // Permission denied

    fn try_create_socket(mode: SocketMode) -> Result<Socket, std::io::Error> {
        let socket_type = match mode {
            SocketMode::Raw => Type::RAW,
            SocketMode::Dgram => Type::DGRAM,
        };
        Socket::new(Domain::IPV4, socket_type, Some(Protocol::ICMPV4))
    }

    fn is_permission_error(err: &std::io::Error) -> bool {
        matches!(err.kind(), std::io::ErrorKind::PermissionDenied)
            || err
                .raw_os_error()
                .map(|code| code == EPERM || code == EACCES)
                .unwrap_or(false)
    }

    fn bind_port(target: &Target) -> u16 {
        if cfg!(target_os = "linux") {
            target.identifier
        } else {
            0
        }
    }

    fn open(target: &Target, mode: SocketMode) -> Result<Box<dyn EchoTransport>, std::io::Error> {
        let socket = try_create_socket(mode)?;
        if mode == SocketMode::Dgram {
            let port = bind_port(target);
            let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
            socket.bind(&bind_addr.into())?;

            // The kernel stamps the bound port into every request as the identifier
            let bound = socket.local_addr()?.as_socket_ipv4().map(|addr| addr.port());
            if cfg!(target_os = "linux") && bound != Some(target.identifier) {
                return Err(std::io::Error::other(format!(
                    "datagram socket bound to port {:?}, not echo identifier {}",
                    bound, target.identifier
                )));
            }
        }
        let transport = IcmpV4Transport::new(socket, mode).map_err(std::io::Error::other)?;
        Ok(Box::new(transport))
    }

    pub(super) fn create_echo_transport(
        target: &Target,
        preferred_mode: Option<SocketMode>,
    ) -> Result<Box<dyn EchoTransport>, PingerError> {
        let modes = match preferred_mode {
            Some(mode) => vec![mode],
            None => vec![SocketMode::Raw, SocketMode::Dgram],
        };

        let mut last_error = None;
        for mode in modes {
            match open(target, mode) {
                Ok(transport) => {
                    info!(
                        address = %target.address,
                        identifier = target.identifier,
                        "Using {} ICMP socket",
                        mode.description()
                    );
                    return Ok(transport);
                }
                Err(err) => {
                    debug!(
                        address = %target.address,
                        "{} ICMP socket unavailable: {}",
                        mode.description(),
                        err
                    );
                    last_error = Some((mode, err));
                }
            }
        }

        match last_error {
            Some((_, err)) if is_permission_error(&err) => {
                Err(PingerError::InsufficientPermissions {
                    required: "root, CAP_NET_RAW, or a ping group covering this user".to_string(),
                    suggestion: format!(
                        "Run with {} or configure: sudo sysctl -w net.ipv4.ping_group_range=\"0 65535\"",
                        sudo_hint()
                    ),
                })
            }
            Some((mode, err)) => Err(PingerError::SocketError(format!(
                "{} ICMP socket for {}: {}",
                mode.description(),
                target.address,
                err
            ))),
            None => Err(PingerError::SocketError(
                "no socket mode available".to_string(),
            )),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_permission_error_detection() {
            let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
            assert!(is_permission_error(&denied));

            let eperm = std::io::Error::from_raw_os_error(EPERM);
            assert!(is_permission_error(&eperm));

            let other = std::io::Error::from(std::io::ErrorKind::AddrInUse);
            assert!(!is_permission_error(&other));
        }

        #[tokio::test]
        async fn test_zero_identifier_never_yields_linux_dgram_transport() {
            // Port 0 would be replaced by an ephemeral port, and with it the identifier
            let target = Target::with_identifier(Ipv4Addr::LOCALHOST, 0, Vec::new());
            let result = create_echo_transport(&target, Some(SocketMode::Dgram));
            if cfg!(target_os = "linux") {
                assert!(result.is_err());
            }
        }

        #[test]
        fn test_dgram_bind_port_follows_identifier_on_linux() {
            let target = Target::with_identifier(Ipv4Addr::LOCALHOST, 4242, Vec::new());
            if cfg!(target_os = "linux") {
                assert_eq!(bind_port(&target), 4242);
            } else {
                assert_eq!(bind_port(&target), 0);
            }
        }
    }
}

#[cfg(not(unix))]
mod platform {
    use super::super::{EchoTransport, SocketMode};
    use crate::pinger::PingerError;
    use crate::probe::Target;

    pub(super) fn create_echo_transport(
        _target: &Target,
        _preferred_mode: Option<SocketMode>,
    ) -> Result<Box<dyn EchoTransport>, PingerError> {
        Err(PingerError::NotImplemented {
            feature: format!("ICMP probing on {}", std::env::consts::OS),
        })
    }
}
