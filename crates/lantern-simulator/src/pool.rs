//! Per-origin connection pool
//!
//! Leases connections to network nodes under the per-origin ceiling:
//! - HTTP/1.x carries one request per connection
//! - H2/H3 keeps a single connection per origin and multiplexes once it is warm
//! - a cold connection already carrying a request makes others wait

use crate::connection::{ConnectionId, TcpConnection};
use indexmap::IndexMap;
use lantern_graph::NetworkNode;

/// A connection handed to one request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lease {
    pub connection: ConnectionId,
    /// Handshake must be paid before the request can go out
    pub fresh: bool,
    /// Window the transfer starts with (segments)
    pub congestion_window: f64,
}

#[derive(Debug, Clone, Default)]
struct OriginSlots {
    connections: Vec<ConnectionId>,
    in_flight: usize,
}

/// Connection pool owned by a single simulation run
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    max_per_origin: usize,
    connections: Vec<TcpConnection>,
    origins: IndexMap<String, OriginSlots>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(max_per_origin: usize) -> Self {
        Self {
            max_per_origin,
            connections: Vec::new(),
            origins: IndexMap::new(),
        }
    }

    /// Requests currently holding a connection to `origin`
    #[must_use]
    pub fn in_flight(&self, origin: &str) -> usize {
        self.origins.get(origin).map_or(0, |slots| slots.in_flight)
    }

    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<&TcpConnection> {
        self.connections.get(id.0 as usize)
    }

    /// Connections opened so far, across all origins
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Try to give `request` a connection; `None` means it has to wait
    pub fn acquire(&mut self, request: &NetworkNode) -> Option<Lease> {
        let max_per_origin = self.max_per_origin;
        let slots = self.origins.entry(request.origin.clone()).or_default();
        if slots.in_flight >= max_per_origin {
            return None;
        }

        let multiplexed = request.protocol.supports_multiplexing();
        let candidates: Vec<&TcpConnection> = slots
            .connections
            .iter()
            .map(|&id| &self.connections[id.0 as usize])
            .filter(|c| c.is_multiplexed() == multiplexed)
            .collect();

        let chosen = if multiplexed {
            match candidates.first() {
                Some(c) if !c.is_idle() => {
                    if c.is_warm() && request.is_connection_reusable {
                        Some((c.id(), false))
                    } else {
                        return None;
                    }
                }
                Some(c) => Some((c.id(), !(c.is_warm() && request.is_connection_reusable))),
                None => None,
            }
        } else {
            let idle: Vec<&TcpConnection> =
                candidates.iter().copied().filter(|c| c.is_idle()).collect();
            let warm = idle
                .iter()
                .filter(|c| c.is_warm())
                .max_by(|a, b| {
                    a.congestion_window()
                        .total_cmp(&b.congestion_window())
                        .then(b.id().cmp(&a.id()))
                })
                .map(|c| c.id());

            match warm {
                Some(id) if request.is_connection_reusable => Some((id, false)),
                _ if candidates.len() < max_per_origin => None,
                // Recycle an idle socket: cold ones first, then lowest id
                _ => match idle.iter().min_by_key(|c| (c.is_warm(), c.id())) {
                    Some(c) => Some((c.id(), true)),
                    None => return None,
                },
            }
        };

        let (id, fresh) = match chosen {
            Some(chosen) => chosen,
            None => (self.open(&request.origin, multiplexed), true),
        };

        let connection = &mut self.connections[id.0 as usize];
        if fresh {
            connection.reset();
        }
        connection.lease();
        let congestion_window = connection.congestion_window();
        if let Some(slots) = self.origins.get_mut(&request.origin) {
            slots.in_flight += 1;
        }

        Some(Lease {
            connection: id,
            fresh,
            congestion_window,
        })
    }

    /// Return a connection after its request completed
    pub fn release(&mut self, id: ConnectionId, congestion_window: f64) {
        let connection = &mut self.connections[id.0 as usize];
        connection.release(congestion_window);
        let slots = self
            .origins
            .get_mut(connection.origin())
            .expect("pooled connection always has origin slots");
        assert!(slots.in_flight > 0, "origin in-flight count underflow");
        slots.in_flight -= 1;
    }

    fn open(&mut self, origin: &str, multiplexed: bool) -> ConnectionId {
        let id = ConnectionId(
            u32::try_from(self.connections.len()).expect("connection count exceeds u32::MAX"),
        );
        self.connections.push(TcpConnection::new(id, origin, multiplexed));
        if let Some(slots) = self.origins.get_mut(origin) {
            slots.connections.push(id);
        }
        tracing::trace!("Opened connection {:?} to {}", id, origin);
        id
    }
}
