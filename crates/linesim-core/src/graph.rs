use crate::entity::Entity;
use crate::id::{EntityId, LinkId, PortId};
use crate::ports::{PortError, PortLink};
use crate::station::{Station, StationKind};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while building the flow graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("an entity named {0} already exists")]
    DuplicateName(String),
    #[error("unknown entity {0}")]
    UnknownEntity(String),
    #[error("{0} cannot send items")]
    CannotSend(String),
    #[error("{0} cannot receive items")]
    CannotReceive(String),
    #[error("{0} cannot be connected to itself")]
    SelfLoop(String),
    #[error("{from} is already connected to {to}")]
    AlreadyConnected { from: String, to: String },
    #[error("{from} is not connected to {to}")]
    NoSuchLink { from: String, to: String },
    #[error("{entity}: {source}")]
    PortTaken {
        entity: String,
        #[source]
        source: PortError,
    },
}

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// A directed connection, described by the ports used at each end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: EntityId,
    pub to: EntityId,
    pub out_port: PortId,
    pub in_port: PortId,
}

/// Links touching one entity.
#[derive(Debug, Clone, Default)]
struct Adjacency {
    /// Links whose destination is this entity.
    inputs: Vec<LinkId>,
    /// Links whose origin is this entity.
    outputs: Vec<LinkId>,
}

// ---------------------------------------------------------------------------
// FlowGraph
// ---------------------------------------------------------------------------

/// Stations plus the directed links between them.
///
/// Adjacency lives in a `SecondaryMap` keyed by `EntityId` so it stays in
/// step with the primary arena. Every link is also recorded in the port
/// tables of both endpoints; `connect`/`disconnect` update all three.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    stations: SlotMap<EntityId, Station>,
    names: BTreeMap<String, EntityId>,
    order: Vec<EntityId>,
    links: SlotMap<LinkId, Link>,
    adjacency: SecondaryMap<EntityId, Adjacency>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Stations
    // -----------------------------------------------------------------------

    /// Add a station. Names are unique.
    pub fn add(&mut self, station: Station) -> Result<EntityId, GraphError> {
        let name = station.name().to_string();
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateName(name));
        }
        let id = self.stations.insert(station);
        self.adjacency.insert(id, Adjacency::default());
        self.names.insert(name, id);
        self.order.push(id);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Resolve a name, failing with `UnknownEntity`.
    pub fn require(&self, name: &str) -> Result<EntityId, GraphError> {
        self.id(name)
            .ok_or_else(|| GraphError::UnknownEntity(name.to_string()))
    }

    pub fn get(&self, id: EntityId) -> Option<&Station> {
        self.stations.get(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Station> {
        self.stations.get_mut(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Station> {
        self.id(name).and_then(|id| self.stations.get(id))
    }

    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.stations.get(id).map(|s| s.name())
    }

    /// Two distinct stations, mutably.
    pub fn pair_mut(&mut self, a: EntityId, b: EntityId) -> Option<[&mut Station; 2]> {
        self.stations.get_disjoint_mut([a, b])
    }

    /// Station ids in insertion order.
    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Stations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Station)> {
        self.order
            .iter()
            .filter_map(|&id| self.stations.get(id).map(|s| (id, s)))
    }

    pub(crate) fn stations_mut(&mut self) -> impl Iterator<Item = &mut Station> {
        self.stations.values_mut()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    /// Connect `from -> to` on the given ports, or the lowest free port on
    /// each side when `None`.
    pub fn connect(
        &mut self,
        from: EntityId,
        to: EntityId,
        out_port: Option<PortId>,
        in_port: Option<PortId>,
    ) -> Result<LinkId, GraphError> {
        let (from_name, to_name) = self.names_of(from, to)?;
        if from == to {
            return Err(GraphError::SelfLoop(from_name));
        }
        if self.link_between(from, to).is_some() {
            return Err(GraphError::AlreadyConnected {
                from: from_name,
                to: to_name,
            });
        }
        let [up, down] = self
            .pair_mut(from, to)
            .ok_or_else(|| GraphError::UnknownEntity(to_name.clone()))?;
        if matches!(up.kind(), StationKind::Sink) {
            return Err(GraphError::CannotSend(from_name));
        }
        if matches!(down.kind(), StationKind::Source) {
            return Err(GraphError::CannotReceive(to_name));
        }

        let out_port = out_port.unwrap_or_else(|| up.core().outputs().next_free());
        let in_port = in_port.unwrap_or_else(|| down.core().inputs().next_free());
        if up.core().outputs().is_taken(out_port) {
            return Err(GraphError::PortTaken {
                entity: from_name,
                source: PortError::Taken(out_port),
            });
        }
        if down.core().inputs().is_taken(in_port) {
            return Err(GraphError::PortTaken {
                entity: to_name,
                source: PortError::Taken(in_port),
            });
        }
        up.core_mut()
            .ports_out
            .wire(
                Some(out_port),
                PortLink {
                    peer: to,
                    peer_port: in_port,
                },
            )
            .map_err(|source| GraphError::PortTaken {
                entity: from_name.clone(),
                source,
            })?;
        down.core_mut()
            .ports_in
            .wire(
                Some(in_port),
                PortLink {
                    peer: from,
                    peer_port: out_port,
                },
            )
            .map_err(|source| GraphError::PortTaken {
                entity: to_name.clone(),
                source,
            })?;

        let link = self.links.insert(Link {
            from,
            to,
            out_port,
            in_port,
        });
        if let Some(adj) = self.adjacency.get_mut(from) {
            adj.outputs.push(link);
        }
        if let Some(adj) = self.adjacency.get_mut(to) {
            adj.inputs.push(link);
        }
        log::debug!("connected {from_name} {out_port} -> {to_name} {in_port}");
        Ok(link)
    }

    /// Remove the link `from -> to`, unwiring both port tables.
    pub fn disconnect(&mut self, from: EntityId, to: EntityId) -> Result<Link, GraphError> {
        let (from_name, to_name) = self.names_of(from, to)?;
        let Some(link_id) = self.link_between(from, to) else {
            return Err(GraphError::NoSuchLink {
                from: from_name,
                to: to_name,
            });
        };
        let Some(link) = self.links.remove(link_id) else {
            return Err(GraphError::NoSuchLink {
                from: from_name,
                to: to_name,
            });
        };
        if let Some([up, down]) = self.pair_mut(from, to) {
            up.core_mut()
                .ports_out
                .unwire(link.out_port)
                .map_err(|source| GraphError::PortTaken {
                    entity: from_name.clone(),
                    source,
                })?;
            down.core_mut()
                .ports_in
                .unwire(link.in_port)
                .map_err(|source| GraphError::PortTaken {
                    entity: to_name.clone(),
                    source,
                })?;
        }
        if let Some(adj) = self.adjacency.get_mut(from) {
            adj.outputs.retain(|&l| l != link_id);
        }
        if let Some(adj) = self.adjacency.get_mut(to) {
            adj.inputs.retain(|&l| l != link_id);
        }
        log::debug!("disconnected {from_name} -> {to_name}");
        Ok(link)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn links(&self) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links.iter()
    }

    pub fn link_between(&self, from: EntityId, to: EntityId) -> Option<LinkId> {
        self.adjacency
            .get(from)?
            .outputs
            .iter()
            .copied()
            .find(|&l| self.links.get(l).is_some_and(|link| link.to == to))
    }

    /// Downstream links of `id`, ordered by output port.
    pub fn outputs(&self, id: EntityId) -> Vec<&Link> {
        let mut out: Vec<&Link> = self
            .adjacency
            .get(id)
            .map(|adj| adj.outputs.iter().filter_map(|&l| self.links.get(l)).collect())
            .unwrap_or_default();
        out.sort_by_key(|link| link.out_port);
        out
    }

    /// Upstream links of `id`, ordered by input port.
    pub fn inputs(&self, id: EntityId) -> Vec<&Link> {
        let mut inp: Vec<&Link> = self
            .adjacency
            .get(id)
            .map(|adj| adj.inputs.iter().filter_map(|&l| self.links.get(l)).collect())
            .unwrap_or_default();
        inp.sort_by_key(|link| link.in_port);
        inp
    }

    /// Downstream station ids, ordered by output port.
    pub fn downstream(&self, id: EntityId) -> Vec<EntityId> {
        self.outputs(id).into_iter().map(|link| link.to).collect()
    }

    pub fn upstream(&self, id: EntityId) -> Vec<EntityId> {
        self.inputs(id).into_iter().map(|link| link.from).collect()
    }

    /// Whether any downstream station of `id` can take an item now.
    pub fn downstream_ready(&self, id: EntityId) -> bool {
        self.downstream(id).into_iter().any(|down| {
            self.stations
                .get(down)
                .is_some_and(|s| s.core().ready_to_receive())
        })
    }

    /// Every link agrees with both endpoint port tables, and no port table
    /// holds an entry without a link.
    pub fn ports_mirror_links(&self) -> bool {
        let links_ok = self.links.values().all(|link| {
            let out_ok = self.stations.get(link.from).is_some_and(|s| {
                s.core().outputs().get(link.out_port)
                    == Some(&PortLink {
                        peer: link.to,
                        peer_port: link.in_port,
                    })
            });
            let in_ok = self.stations.get(link.to).is_some_and(|s| {
                s.core().inputs().get(link.in_port)
                    == Some(&PortLink {
                        peer: link.from,
                        peer_port: link.out_port,
                    })
            });
            out_ok && in_ok
        });
        let wired: usize = self
            .stations
            .values()
            .map(|s| s.core().outputs().len())
            .sum();
        links_ok && wired == self.links.len()
    }

    fn names_of(&self, from: EntityId, to: EntityId) -> Result<(String, String), GraphError> {
        let from_name = self
            .name(from)
            .ok_or_else(|| GraphError::UnknownEntity(format!("{from:?}")))?
            .to_string();
        let to_name = self
            .name(to)
            .ok_or_else(|| GraphError::UnknownEntity(format!("{to:?}")))?
            .to_string();
        Ok((from_name, to_name))
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, BufferConfig};
    use crate::processor::{Processor, ProcessorConfig};
    use crate::sink::Sink;
    use crate::source::Source;
    use crate::workload::{ItemSpec, Schedule};

    fn line() -> (FlowGraph, EntityId, EntityId, EntityId, EntityId) {
        let mut schedule = Schedule::new(["cut"]);
        schedule.push(ItemSpec::new("I1", 0).duration("cut", 2));
        let mut g = FlowGraph::new();
        let s = g
            .add(Station::Source(Source::new("S", schedule).unwrap()))
            .unwrap();
        let b = g
            .add(Station::Buffer(Buffer::new("B", BufferConfig::default())))
            .unwrap();
        let p = g
            .add(Station::Processor(Processor::new(
                "P",
                ProcessorConfig::new("cut"),
            )))
            .unwrap();
        let k = g.add(Station::Sink(Sink::new("K"))).unwrap();
        (g, s, b, p, k)
    }

    #[test]
    fn duplicate_names_rejected() {
        let (mut g, ..) = line();
        assert_eq!(
            g.add(Station::Sink(Sink::new("K"))),
            Err(GraphError::DuplicateName("K".into()))
        );
    }

    #[test]
    fn connect_allocates_ports_on_both_sides() {
        let (mut g, s, b, p, _) = line();
        g.connect(s, b, None, None).unwrap();
        g.connect(s, p, None, None).unwrap();
        let link = g.link(g.link_between(s, p).unwrap()).unwrap();
        assert_eq!(link.out_port, PortId(1));
        assert_eq!(link.in_port, PortId(0));
        assert_eq!(g.downstream(s), vec![b, p]);
        assert_eq!(g.upstream(p), vec![s]);
        assert!(g.ports_mirror_links());
    }

    #[test]
    fn explicit_port_collision_rejected() {
        let (mut g, s, b, p, _) = line();
        g.connect(s, b, Some(PortId(3)), None).unwrap();
        let err = g.connect(s, p, Some(PortId(3)), None).unwrap_err();
        assert!(matches!(err, GraphError::PortTaken { .. }));
        assert!(g.ports_mirror_links());
    }

    #[test]
    fn direction_is_checked() {
        let (mut g, s, b, _, k) = line();
        assert_eq!(
            g.connect(k, b, None, None),
            Err(GraphError::CannotSend("K".into()))
        );
        assert_eq!(
            g.connect(b, s, None, None),
            Err(GraphError::CannotReceive("S".into()))
        );
        assert_eq!(
            g.connect(b, b, None, None),
            Err(GraphError::SelfLoop("B".into()))
        );
    }

    #[test]
    fn connect_twice_rejected() {
        let (mut g, s, b, ..) = line();
        g.connect(s, b, None, None).unwrap();
        assert!(matches!(
            g.connect(s, b, None, None),
            Err(GraphError::AlreadyConnected { .. })
        ));
    }

    #[test]
    fn disconnect_unwires_and_frees_port() {
        let (mut g, s, b, p, _) = line();
        g.connect(s, b, None, None).unwrap();
        g.connect(s, p, None, None).unwrap();
        g.disconnect(s, b).unwrap();
        assert_eq!(g.downstream(s), vec![p]);
        assert!(g.get(b).unwrap().core().inputs().is_empty());
        assert_eq!(g.get(s).unwrap().core().outputs().next_free(), PortId(0));
        assert!(g.ports_mirror_links());
    }

    #[test]
    fn disconnect_missing_link_errors() {
        let (mut g, _, b, p, _) = line();
        assert_eq!(
            g.disconnect(b, p),
            Err(GraphError::NoSuchLink {
                from: "B".into(),
                to: "P".into()
            })
        );
    }

    #[test]
    fn downstream_ready_reflects_capacity() {
        let (mut g, s, _, p, _) = line();
        g.connect(s, p, None, None).unwrap();
        assert!(g.downstream_ready(s));
        let item = crate::item::Item::new("x", None, 0).with_process("cut", 3);
        g.get_mut(p).unwrap().receive(item, 0).unwrap();
        assert!(!g.downstream_ready(s));
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let (g, s, b, p, k) = line();
        let ids: Vec<EntityId> = g.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![s, b, p, k]);
        assert_eq!(g.require("nope"), Err(GraphError::UnknownEntity("nope".into())));
    }
}
