//! Joining a host
//!
//! [`connect`] performs the handshake as one async operation: it sends
//! `Connect` with the room code, resends it until the host answers, and
//! resolves once the host accepts or rejects the peer. The attempt is raced
//! against a timeout and a cancellation signal.
//!
//! Failures the game knows how to present (unreachable host, rejection,
//! timeout, cancellation) become [`ConnectionStatus::Error`]; anything else is
//! returned to the caller as fatal.

use bincode::{deserialize, serialize};
use log::{debug, info, warn};
use shared::{Packet, PlayerId, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{interval, sleep};

/// How often `Connect` is resent while waiting for the host.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Joined,
    Error(String),
    Closed,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("host unreachable: {0}")]
    Unreachable(String),
    #[error("rejected by host: {0}")]
    Rejected(String),
    #[error("no answer from host within {0:?}")]
    Timeout(Duration),
    #[error("connection attempt cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] bincode::Error),
}

impl ConnectError {
    /// Whether this failure ends the attempt with an error status instead of
    /// propagating.
    pub fn is_recognised(&self) -> bool {
        matches!(
            self,
            ConnectError::Unreachable(_)
                | ConnectError::Rejected(_)
                | ConnectError::Timeout(_)
                | ConnectError::Cancelled
        )
    }
}

/// Result of a successful handshake.
#[derive(Debug)]
pub struct Joined {
    pub player_id: PlayerId,
    /// Packets that arrived ahead of `Connected`, in arrival order.
    pub early_packets: Vec<Packet>,
}

/// Maps the outcome of a connect attempt onto a status. Unrecognised errors
/// are handed back for the caller to propagate.
pub fn status_for(result: &Result<Joined, ConnectError>) -> Option<ConnectionStatus> {
    match result {
        Ok(_) => Some(ConnectionStatus::Joined),
        Err(e) if e.is_recognised() => Some(ConnectionStatus::Error(e.to_string())),
        Err(_) => None,
    }
}

/// Resolves `host` (`ip:port` or `name:port`) to a socket address.
pub async fn resolve_host(host: &str) -> Result<SocketAddr, ConnectError> {
    let mut addrs = tokio::net::lookup_host(host)
        .await
        .map_err(|e| ConnectError::Unreachable(format!("{}: {}", host, e)))?;
    addrs
        .next()
        .ok_or_else(|| ConnectError::Unreachable(format!("{}: no address", host)))
}

/// Runs the handshake with the host at `host_addr`.
///
/// Resolves with [`ConnectError::Cancelled`] as soon as `cancel` is set to
/// true, and with [`ConnectError::Timeout`] if the host has not answered
/// within `timeout`.
pub async fn connect(
    socket: &UdpSocket,
    host_addr: SocketAddr,
    room_code: &str,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> Result<Joined, ConnectError> {
    if *cancel.borrow() {
        return Err(ConnectError::Cancelled);
    }

    let hello = serialize(&Packet::Connect {
        client_version: PROTOCOL_VERSION,
        room_code: room_code.to_string(),
    })?;

    let deadline = sleep(timeout);
    tokio::pin!(deadline);
    let mut retry = interval(CONNECT_RETRY_INTERVAL);
    let mut buffer = vec![0u8; MAX_PACKET_SIZE];
    let mut early_packets = Vec::new();

    info!("Connecting to {} with room code {}", host_addr, room_code);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return Err(ConnectError::Timeout(timeout));
            }

            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return Err(ConnectError::Cancelled);
                }
            }

            _ = retry.tick() => {
                debug!("Sending connect request");
                socket.send_to(&hello, host_addr).await.map_err(unreachable_or_io)?;
            }

            result = socket.recv_from(&mut buffer) => {
                let (len, from) = result.map_err(unreachable_or_io)?;
                if from != host_addr {
                    debug!("Ignoring packet from {}", from);
                    continue;
                }

                match deserialize::<Packet>(&buffer[..len]) {
                    Ok(Packet::Connected { player_id }) => {
                        info!("Joined as {}", player_id);
                        return Ok(Joined { player_id, early_packets });
                    }
                    Ok(Packet::Disconnected { reason }) => {
                        return Err(ConnectError::Rejected(reason));
                    }
                    Ok(packet) => early_packets.push(packet),
                    Err(e) => warn!("Failed to deserialize packet from host: {}", e),
                }
            }
        }
    }
}

fn unreachable_or_io(e: std::io::Error) -> ConnectError {
    match e.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::AddrNotAvailable => {
            ConnectError::Unreachable(e.to_string())
        }
        _ => ConnectError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    async fn sockets() -> (UdpSocket, UdpSocket) {
        let host = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (host, client)
    }

    async fn reply_to_first(host: UdpSocket, packets: Vec<Packet>) {
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let (len, from) = host.recv_from(&mut buffer).await.unwrap();
        let request: Packet = deserialize(&buffer[..len]).unwrap();
        assert!(matches!(request, Packet::Connect { .. }));

        for packet in packets {
            host.send_to(&serialize(&packet).unwrap(), from).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_connect_joins() {
        let (host, client) = sockets().await;
        let host_addr = host.local_addr().unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(reply_to_first(
            host,
            vec![Packet::Connected {
                player_id: PlayerId(3),
            }],
        ));

        let result = connect(&client, host_addr, "QZKX", Duration::from_secs(2), cancel_rx).await;
        let joined = assert_ok!(result);
        assert_eq!(joined.player_id, PlayerId(3));
        assert!(joined.early_packets.is_empty());
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let (host, client) = sockets().await;
        let host_addr = host.local_addr().unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(reply_to_first(
            host,
            vec![Packet::Disconnected {
                reason: "unknown room code".to_string(),
            }],
        ));

        let result = connect(&client, host_addr, "NOPE", Duration::from_secs(2), cancel_rx).await;
        assert_eq!(
            status_for(&result),
            Some(ConnectionStatus::Error(
                "rejected by host: unknown room code".to_string()
            ))
        );
        assert!(matches!(assert_err!(result), ConnectError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        let (host, client) = sockets().await;
        let host_addr = host.local_addr().unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let result = connect(
            &client,
            host_addr,
            "QZKX",
            Duration::from_millis(50),
            cancel_rx,
        )
        .await;

        assert!(matches!(result, Err(ConnectError::Timeout(_))));
        drop(host);
    }

    #[tokio::test]
    async fn test_connect_cancelled() {
        let (host, client) = sockets().await;
        let host_addr = host.local_addr().unwrap();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            let _ = cancel_tx.send(true);
        });

        let result = connect(&client, host_addr, "QZKX", Duration::from_secs(5), cancel_rx).await;
        assert!(matches!(result, Err(ConnectError::Cancelled)));
        drop(host);
    }

    #[tokio::test]
    async fn test_early_packets_are_kept() {
        let (host, client) = sockets().await;
        let host_addr = host.local_addr().unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(reply_to_first(
            host,
            vec![
                Packet::Disconnect,
                Packet::Connected {
                    player_id: PlayerId(1),
                },
            ],
        ));

        let joined = connect(&client, host_addr, "QZKX", Duration::from_secs(2), cancel_rx)
            .await
            .unwrap();
        assert_eq!(joined.early_packets, vec![Packet::Disconnect]);
    }

    #[test]
    fn test_unrecognised_errors_have_no_status() {
        let io = ConnectError::Io(std::io::Error::new(ErrorKind::Other, "boom"));
        assert!(!io.is_recognised());
        assert_eq!(status_for(&Err(io)), None);
    }
}
