//! Connected peers and their buffered input
//!
//! Tracks every peer that completed the handshake: the player id it was
//! assigned, its address, when it was last heard from, and the inputs that
//! arrived since the last tick. Joining the game roster is a separate step
//! handled by the session controller, so a peer can be known here and still
//! be rejected for lack of a player slot.

use log::info;
use shared::{InputState, PlayerId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Peers not heard from for this long are dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Client {
    pub player_id: PlayerId,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    /// Highest input sequence already handed to the simulation.
    pub last_processed_input: u32,
    pub pending_inputs: Vec<InputState>,
}

impl Client {
    pub fn new(player_id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            player_id,
            addr,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Buffers an input, keeping the buffer ordered by sequence. Inputs that
    /// were already processed are dropped.
    pub fn add_input(&mut self, input: InputState) -> bool {
        self.last_seen = Instant::now();
        if input.sequence <= self.last_processed_input {
            return false;
        }
        if self
            .pending_inputs
            .iter()
            .any(|pending| pending.sequence == input.sequence)
        {
            return false;
        }

        self.pending_inputs.push(input);
        self.pending_inputs.sort_by_key(|i| i.sequence);
        true
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

pub struct ClientManager {
    clients: HashMap<PlayerId, Client>,
    next_player_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_player_id: 1,
            max_clients,
        }
    }

    /// Registers a peer under a fresh player id. Returns `None` when the
    /// connection limit is reached.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let player_id = PlayerId(self.next_player_id);
        self.next_player_id += 1;

        info!("{} connected from {}", player_id, addr);
        self.clients.insert(player_id, Client::new(player_id, addr));
        Some(player_id)
    }

    pub fn remove_client(&mut self, player_id: PlayerId) -> Option<Client> {
        let client = self.clients.remove(&player_id)?;
        info!("{} disconnected", client.player_id);
        Some(client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.player_id)
    }

    pub fn add_input(&mut self, player_id: PlayerId, input: InputState) -> bool {
        self.clients
            .get_mut(&player_id)
            .map_or(false, |client| client.add_input(input))
    }

    /// Takes every buffered input, ordered by client timestamp, and marks them
    /// processed.
    pub fn drain_inputs(&mut self) -> Vec<(PlayerId, InputState)> {
        let mut inputs: Vec<(PlayerId, InputState)> = Vec::new();

        for client in self.clients.values_mut() {
            for input in client.pending_inputs.drain(..) {
                client.last_processed_input = client.last_processed_input.max(input.sequence);
                inputs.push((client.player_id, input));
            }
        }

        inputs.sort_by_key(|(player_id, input)| (input.timestamp, *player_id, input.sequence));
        inputs
    }

    /// Removes and returns peers that have gone quiet for `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.player_id)
            .collect();

        for player_id in &timed_out {
            self.remove_client(*player_id);
        }
        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .values()
            .map(|client| (client.player_id, client.addr))
            .collect()
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Client> {
        self.clients.get(&player_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn input(sequence: u32, timestamp: u64) -> InputState {
        InputState {
            sequence,
            timestamp,
            ..InputState::default()
        }
    }

    #[test]
    fn test_client_add_input_orders_by_sequence() {
        let mut client = Client::new(PlayerId(1), test_addr());

        assert!(client.add_input(input(2, 100)));
        assert!(client.add_input(input(1, 50)));
        assert!(!client.add_input(input(2, 100)));

        assert_eq!(client.pending_inputs.len(), 2);
        assert_eq!(client.pending_inputs[0].sequence, 1);
        assert_eq!(client.pending_inputs[1].sequence, 2);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(PlayerId(1), test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));
        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));

        // Any input counts as activity, even one already processed.
        client.last_processed_input = 5;
        assert!(!client.add_input(input(1, 100)));
        assert!(!client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_player_ids_are_not_reused() {
        let mut manager = ClientManager::new(4);

        let first = manager.add_client(test_addr()).unwrap();
        manager.remove_client(first);
        let second = manager.add_client(test_addr()).unwrap();

        assert_eq!(first, PlayerId(1));
        assert_eq!(second, PlayerId(2));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let first = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(first));
        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown), None);
    }

    #[test]
    fn test_add_input_to_unknown_client() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.add_input(PlayerId(999), input(1, 100)));
    }

    #[test]
    fn test_drain_inputs_chronological_and_marks_processed() {
        let mut manager = ClientManager::new(3);
        let a = manager.add_client(test_addr()).unwrap();
        let b = manager.add_client(test_addr2()).unwrap();

        manager.add_input(a, input(1, 100));
        manager.add_input(b, input(1, 50));
        manager.add_input(a, input(2, 200));

        let drained = manager.drain_inputs();
        let timestamps: Vec<u64> = drained.iter().map(|(_, i)| i.timestamp).collect();
        assert_eq!(timestamps, vec![50, 100, 200]);
        assert_eq!(manager.get(a).unwrap().last_processed_input, 2);

        assert!(!manager.add_input(a, input(2, 200)));
        assert!(manager.drain_inputs().is_empty());
    }

    #[test]
    fn test_check_timeouts_removes_quiet_clients() {
        let mut manager = ClientManager::new(2);
        let a = manager.add_client(test_addr()).unwrap();
        let b = manager.add_client(test_addr2()).unwrap();
        manager.clients.get_mut(&a).unwrap().last_seen = Instant::now() - Duration::from_secs(10);

        assert_eq!(manager.check_timeouts(CLIENT_TIMEOUT), vec![a]);
        assert!(manager.get(a).is_none());
        assert!(manager.get(b).is_some());
    }
}
