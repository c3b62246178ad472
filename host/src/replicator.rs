//! Host side of the replication transport
//!
//! The simulation never talks to sockets. It creates and destroys networked
//! entities and issues remote calls through [`HostReplicator`], which applies
//! the change to the host world immediately and queues a matching
//! [`ReplicationEvent`]. The network loop drains the queue after each tick and
//! broadcasts the events in order.

use log::debug;
use shared::{
    EntityHandle, NetworkEntityId, Packet, PrefabKind, RemoteCall, RemoteMethod, World,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    Created {
        id: NetworkEntityId,
        prefab: PrefabKind,
    },
    Destroyed {
        id: NetworkEntityId,
    },
    Call(RemoteCall),
}

impl ReplicationEvent {
    pub fn to_packet(&self) -> Packet {
        match self {
            ReplicationEvent::Created { id, prefab } => Packet::EntityCreated {
                id: *id,
                prefab: *prefab,
            },
            ReplicationEvent::Destroyed { id } => Packet::EntityDestroyed { id: *id },
            ReplicationEvent::Call(call) => Packet::Call(*call),
        }
    }
}

pub struct HostReplicator {
    next_id: u32,
    next_call_seq: u64,
    outbox: Vec<ReplicationEvent>,
}

impl HostReplicator {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            next_call_seq: 1,
            outbox: Vec::new(),
        }
    }

    /// Instantiates `prefab` under a fresh network id and announces it.
    pub fn create(&mut self, world: &mut World, prefab: PrefabKind) -> (EntityHandle, NetworkEntityId) {
        let id = NetworkEntityId(self.next_id);
        self.next_id += 1;

        let handle = world.spawn_networked(id, prefab);
        debug!("Created {} {}", prefab.name(), id);
        self.outbox.push(ReplicationEvent::Created { id, prefab });
        (handle, id)
    }

    /// Removes an entity. Destruction of networked entities is announced;
    /// local ones (platforms) just disappear.
    pub fn destroy(&mut self, world: &mut World, handle: EntityHandle) -> bool {
        let id = world.network_id_of(handle);
        if world.despawn(handle).is_none() {
            return false;
        }

        if let Some(id) = id {
            debug!("Destroyed {}", id);
            self.outbox.push(ReplicationEvent::Destroyed { id });
        }
        true
    }

    /// Queues a remote call for every peer.
    pub fn send_remote_call(&mut self, target: NetworkEntityId, method: RemoteMethod) -> RemoteCall {
        let call = RemoteCall {
            seq: self.next_call_seq,
            target,
            method,
        };
        self.next_call_seq += 1;

        debug!("Remote call {} #{} -> {}", method.name(), call.seq, target);
        self.outbox.push(ReplicationEvent::Call(call));
        call
    }

    pub fn pending(&self) -> &[ReplicationEvent] {
        &self.outbox
    }

    /// Takes every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<ReplicationEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Creation events for every networked entity currently alive, used to
    /// bring a newly joined peer up to date.
    pub fn creation_events(world: &World) -> Vec<ReplicationEvent> {
        world
            .capture_all()
            .into_iter()
            .map(|snapshot| ReplicationEvent::Created {
                id: snapshot.id,
                prefab: snapshot.prefab,
            })
            .collect()
    }
}

impl Default for HostReplicator {
    fn default() -> Self {
        Self::new()
    }
}
