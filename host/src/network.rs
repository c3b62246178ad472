//! Host network layer: UDP transport and the tick loop
//!
//! Socket receive, socket send, timeout checking and operator input each run
//! as their own task and talk to the main loop over channels. The main loop is
//! the only owner of the [`HostGame`], so the world and its registry are never
//! shared between tasks.

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::game::HostGame;
use crate::room::room_code_matches;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{InputState, Packet, PlayerId, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Longest simulation step taken in one tick, in milliseconds.
pub const MAX_TICK_MS: f32 = 50.0;

/// Messages sent from network tasks to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { player_id: PlayerId },
    /// Key typed by the host operator.
    OperatorKey(char),
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<PlayerId>,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_duration: Duration,
    /// Connection limit. Player slots are limited separately by the session.
    pub max_clients: usize,
    pub room_code: String,
}

pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: HostGame,
    room_code: String,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    /// Binds the socket and loads the first level.
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Host listening on {}", socket.local_addr()?);

        let mut game = HostGame::new();
        game.start()?;

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            game,
            room_code: config.room_code,
            tick_duration: config.tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn game(&self) -> &HostGame {
        &self.game
    }

    /// Handle for feeding messages into the main loop from outside.
    pub fn sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let addrs = clients.read().await.get_client_addrs();
                        for (player_id, addr) in addrs {
                            if Some(player_id) == exclude {
                                continue;
                            }
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", player_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;
                let timed_out = clients.write().await.check_timeouts(CLIENT_TIMEOUT);

                for player_id in timed_out {
                    if server_tx
                        .send(ServerMessage::ClientTimeout { player_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    fn spawn_shutdown_signal(&self) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = server_tx.send(ServerMessage::Shutdown);
            }
        });
    }

    /// Reads operator keys from stdin, one line at a time.
    fn spawn_operator_input(&self) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                for key in line.trim().chars() {
                    if server_tx.send(ServerMessage::OperatorKey(key)).is_err() {
                        return;
                    }
                }
            }
            debug!("Operator input closed");
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<PlayerId>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Broadcasts every replication event the game produced, in order.
    fn flush_events(&mut self) {
        for event in self.game.drain_events() {
            self.broadcast_packet(event.to_packet(), None);
        }
    }

    fn reject(&self, addr: SocketAddr, reason: &str) {
        warn!("Rejecting {}: {}", addr, reason);
        self.send_packet(
            Packet::Disconnected {
                reason: reason.to_string(),
            },
            addr,
        );
    }

    async fn handle_connect(&mut self, client_version: u32, room_code: &str, addr: SocketAddr) {
        info!("Peer connecting from {} (version: {})", addr, client_version);

        if client_version != PROTOCOL_VERSION {
            self.reject(addr, "protocol version mismatch");
            return;
        }
        if !room_code_matches(&self.room_code, room_code) {
            self.reject(addr, "unknown room code");
            return;
        }

        let existing = self.clients.read().await.find_client_by_addr(addr);
        if let Some(existing) = existing {
            info!("Replacing existing connection {} from {}", existing, addr);
            self.clients.write().await.remove_client(existing);
            self.game.remove_player(existing);
            self.flush_events();
        }

        // Reject before anything is sent so the peer never sees the world.
        if self.game.session().slots().is_full() {
            self.reject(addr, "all player slots are taken");
            return;
        }

        let player_id = self.clients.write().await.add_client(addr);
        let Some(player_id) = player_id else {
            self.reject(addr, "host full");
            return;
        };

        self.send_packet(Packet::Connected { player_id }, addr);
        for packet in self.game.sync_packets() {
            self.send_packet(packet, addr);
        }

        match self.game.add_player(player_id) {
            Ok(slot) => info!("{} joined in slot {}", player_id, slot.position),
            Err(e) => {
                self.clients.write().await.remove_client(player_id);
                self.reject(addr, &e.to_string());
            }
        }
        self.flush_events();
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                room_code,
            } => {
                self.handle_connect(client_version, &room_code, addr).await;
            }

            Packet::Input {
                sequence,
                timestamp,
                left,
                right,
                slam,
                throw_held,
            } => {
                let mut clients = self.clients.write().await;
                if let Some(player_id) = clients.find_client_by_addr(addr) {
                    clients.add_input(
                        player_id,
                        InputState {
                            sequence,
                            timestamp,
                            left,
                            right,
                            slam,
                            throw_held,
                        },
                    );
                }
            }

            Packet::Disconnect => {
                let removed = {
                    let mut clients = self.clients.write().await;
                    clients
                        .find_client_by_addr(addr)
                        .and_then(|player_id| clients.remove_client(player_id))
                };
                if let Some(client) = removed {
                    self.game.remove_player(client.player_id);
                    self.flush_events();
                }
            }

            _ => {
                warn!("Unexpected packet type from {}", addr);
            }
        }
    }

    fn handle_operator_key(&mut self, key: char) {
        match self.game.select_level_from_key(key) {
            Ok(true) => info!("Operator switched to level {}", key),
            Ok(false) => {}
            Err(e) => warn!("Level switch failed: {}", e),
        }
        self.flush_events();
    }

    /// Applies buffered input, advances the game by `dt_ms`, then sends the
    /// tick's events followed by its snapshot.
    async fn process_tick(&mut self, dt_ms: f32) {
        let inputs = self.clients.write().await.drain_inputs();
        for (player_id, input) in &inputs {
            self.game.apply_input(*player_id, input);
        }

        self.game.update(dt_ms.min(MAX_TICK_MS));
        self.flush_events();

        if !self.clients.read().await.is_empty() {
            self.broadcast_packet(self.game.snapshot_packet(), None);
        }
    }

    /// Main loop. Returns after a [`ServerMessage::Shutdown`], sent on ctrl-c
    /// or through [`Server::sender`].
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        self.spawn_operator_input();
        self.spawn_shutdown_signal();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Host started, room code {}", self.room_code);

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        }
                        Some(ServerMessage::ClientTimeout { player_id }) => {
                            info!("{} timed out", player_id);
                            self.game.remove_player(player_id);
                            self.flush_events();
                        }
                        Some(ServerMessage::OperatorKey(key)) => {
                            self.handle_operator_key(key);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Host shutting down");
                            break;
                        }
                    }
                }

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt_ms = now.duration_since(last_tick).as_secs_f32() * 1000.0;
                    last_tick = now;

                    self.process_tick(dt_ms).await;

                    if self.game.tick() % 300 == 0 {
                        debug!("Tick {}: scores {:?}", self.game.tick(), self.game.scores());
                    }
                }
            }
        }

        self.broadcast_packet(
            Packet::Disconnected {
                reason: "host shutting down".to_string(),
            },
            None,
        );
        Ok(())
    }
}
