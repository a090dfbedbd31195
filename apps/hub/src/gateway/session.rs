use guardian_proto::PublicKey;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::registry::{ConnectionHandle, ConnectionId};

/// Identity bound to a connection by a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    pub public_key: PublicKey,
    pub validator_id: Uuid,
}

/// Per-connection state owned by the connection's reader loop
#[derive(Debug)]
pub struct Session {
    handle: ConnectionHandle,
    identity: Option<SessionIdentity>,
}

impl Session {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self { handle, identity: None }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.addr()
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        self.identity
    }

    pub(crate) fn bind(&mut self, identity: SessionIdentity) {
        self.identity = Some(identity);
    }
}
