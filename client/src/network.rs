use crate::connection::{self, status_for, ConnectionStatus};
use crate::game::ClientGame;
use crate::input::{Command, InputManager, KeySample};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{timestamp_millis, InputState, Packet, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{interval, sleep};

/// Snapshots between score log lines.
const SCORE_LOG_INTERVAL: u32 = 300;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub room_code: String,
    pub connect_timeout: Duration,
    pub fake_ping_ms: u64,
}

pub struct Client {
    socket: UdpSocket,
    host_addr: Option<SocketAddr>,
    config: ClientConfig,
    status: ConnectionStatus,

    game: ClientGame,
    input_manager: InputManager,
    keys: KeySample,

    ping_ms: u64,
    snapshots_seen: u32,
}

impl Client {
    pub async fn new(config: ClientConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        Ok(Client {
            socket,
            host_addr: None,
            config,
            status: ConnectionStatus::Connecting,
            game: ClientGame::new(),
            input_manager: InputManager::new(),
            keys: KeySample::default(),
            ping_ms: 0,
            snapshots_seen: 0,
        })
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn game(&self) -> &ClientGame {
        &self.game
    }

    pub fn ping_ms(&self) -> u64 {
        self.ping_ms
    }

    /// Resolves the host and performs the handshake. Returns whether the
    /// client joined; recognised failures are reported through the status.
    pub async fn join(
        &mut self,
        cancel: watch::Receiver<bool>,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        self.status = ConnectionStatus::Connecting;

        let result = match connection::resolve_host(&self.config.host).await {
            Ok(addr) => {
                self.host_addr = Some(addr);
                connection::connect(
                    &self.socket,
                    addr,
                    &self.config.room_code,
                    self.config.connect_timeout,
                    cancel,
                )
                .await
            }
            Err(e) => Err(e),
        };

        self.status = status_for(&result).unwrap_or(ConnectionStatus::Closed);

        match result {
            Ok(joined) => {
                self.game.set_player_id(joined.player_id);
                for packet in joined.early_packets {
                    self.handle_packet(packet);
                }
                Ok(true)
            }
            Err(e) if e.is_recognised() => {
                error!("Could not join: {}", e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let Some(host_addr) = self.host_addr else {
            return Ok(());
        };
        if self.config.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.config.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, host_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.status = ConnectionStatus::Closed;
            }

            Packet::WorldSnapshot { timestamp, .. } if timestamp > 0 => {
                self.ping_ms = timestamp_millis().saturating_sub(timestamp);
                self.snapshots_seen += 1;
                if self.snapshots_seen % SCORE_LOG_INTERVAL == 0 {
                    info!("Scores: {:?} (ping {}ms)", self.game.scores(), self.ping_ms);
                }
                self.apply(packet);
            }

            packet => self.apply(packet),
        }
    }

    fn apply(&mut self, packet: Packet) {
        if let Err(e) = self.game.apply_packet(packet) {
            warn!("Failed to apply packet: {}", e);
        }
        for animation in self.game.take_animations() {
            debug!("{} on {:?}", animation.method.name(), animation.target);
        }
    }

    async fn send_input(&mut self, input: InputState) -> Result<(), Box<dyn std::error::Error>> {
        if self.status != ConnectionStatus::Joined {
            return Ok(());
        }
        self.send_packet(&input.to_packet()).await
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = cancel_tx.send(true);
            }
        });

        if !self.join(cancel_rx.clone()).await? {
            return Ok(());
        }

        info!("Commands: a/d/s to move left/right/stop, w to slam, t to hold or release throw, q to quit");

        let mut input_interval = interval(Duration::from_millis(16));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        while self.status == ConnectionStatus::Joined {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, from)) if Some(from) == self.host_addr => {
                            if self.config.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.config.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        }
                        Ok((_, from)) => debug!("Ignoring packet from {}", from),
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    let input = self.input_manager.update(self.keys);
                    self.keys.slam = false;

                    if let Some(input) = input {
                        if let Err(e) = self.send_input(input).await {
                            error!("Error sending input: {}", e);
                        }
                    }
                },

                line = lines.next_line(), if stdin_open => {
                    match line {
                        Ok(Some(line)) => match Command::parse(&line) {
                            Some(Command::Quit) => break,
                            Some(command) => command.apply(&mut self.keys),
                            None => warn!("Unknown command: {}", line.trim()),
                        },
                        Ok(None) => stdin_open = false,
                        Err(e) => {
                            error!("Error reading stdin: {}", e);
                            stdin_open = false;
                        }
                    }
                },

                _ = cancel_rx.changed() => {
                    info!("Interrupted");
                    break;
                },
            }
        }

        if self.status == ConnectionStatus::Joined {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }
        self.status = ConnectionStatus::Closed;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PlayerId;

    fn config(host: String) -> ClientConfig {
        ClientConfig {
            host,
            room_code: "QZKX".to_string(),
            connect_timeout: Duration::from_secs(2),
            fake_ping_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_join_applies_early_and_sync_packets() {
        let host = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let host_addr = host.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];
            let (_, from) = host.recv_from(&mut buffer).await.unwrap();
            let packets = [
                Packet::WorldSnapshot {
                    tick: 1,
                    timestamp: 0,
                    level_index: Some(1),
                    entities: Vec::new(),
                },
                Packet::Connected {
                    player_id: PlayerId(1),
                },
            ];
            for packet in packets {
                host.send_to(&serialize(&packet).unwrap(), from).await.unwrap();
            }
        });

        let mut client = Client::new(config(host_addr.to_string())).await.unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        assert!(client.join(cancel_rx).await.unwrap());
        assert_eq!(client.status(), &ConnectionStatus::Joined);
        assert_eq!(client.game().player_id(), Some(PlayerId(1)));
        assert_eq!(client.game().current_level_index(), Some(1));
    }

    #[tokio::test]
    async fn test_unresolvable_host_sets_error_status() {
        let mut client = Client::new(config("not an address".to_string()))
            .await
            .unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        assert!(!client.join(cancel_rx).await.unwrap());
        assert!(matches!(client.status(), ConnectionStatus::Error(_)));
    }

    #[tokio::test]
    async fn test_disconnected_packet_closes() {
        let mut client = Client::new(config("127.0.0.1:1".to_string()))
            .await
            .unwrap();
        client.status = ConnectionStatus::Joined;

        client.handle_packet(Packet::Disconnected {
            reason: "host shutting down".to_string(),
        });
        assert_eq!(client.status(), &ConnectionStatus::Closed);
    }
}
