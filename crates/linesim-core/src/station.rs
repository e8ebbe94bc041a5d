//! Closed set of station kinds, stored in one arena and dispatched by
//! `match`.

use crate::buffer::Buffer;
use crate::entity::{Entity, EntityCore, EntityError, FlowContext, Notice};
use crate::fixed::Ticks;
use crate::id::Position;
use crate::item::Item;
use crate::processor::Processor;
use crate::sink::Sink;
use crate::source::Source;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationKind {
    Source,
    Buffer,
    Processor,
    Sink,
}

#[derive(Debug, Clone)]
pub enum Station {
    Source(Source),
    Buffer(Buffer),
    Processor(Processor),
    Sink(Sink),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            Station::Source($s) => $body,
            Station::Buffer($s) => $body,
            Station::Processor($s) => $body,
            Station::Sink($s) => $body,
        }
    };
}

impl Station {
    pub fn kind(&self) -> StationKind {
        match self {
            Station::Source(_) => StationKind::Source,
            Station::Buffer(_) => StationKind::Buffer,
            Station::Processor(_) => StationKind::Processor,
            Station::Sink(_) => StationKind::Sink,
        }
    }

    pub fn as_source(&self) -> Option<&Source> {
        match self {
            Station::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_source_mut(&mut self) -> Option<&mut Source> {
        match self {
            Station::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Buffer> {
        match self {
            Station::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_processor(&self) -> Option<&Processor> {
        match self {
            Station::Processor(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_sink(&self) -> Option<&Sink> {
        match self {
            Station::Sink(k) => Some(k),
            _ => None,
        }
    }

    pub(crate) fn take_notices(&mut self) -> Vec<Notice> {
        match self {
            Station::Source(s) => s.take_notices(),
            Station::Processor(p) => p.take_notices(),
            Station::Buffer(_) | Station::Sink(_) => Vec::new(),
        }
    }
}

impl Entity for Station {
    fn core(&self) -> &EntityCore {
        dispatch!(self, s => s.core())
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        dispatch!(self, s => s.core_mut())
    }

    fn check(&self, now: Ticks, ctx: FlowContext) -> Option<Ticks> {
        dispatch!(self, s => s.check(now, ctx))
    }

    fn act(&mut self, now: Ticks, ctx: FlowContext) -> Result<bool, EntityError> {
        dispatch!(self, s => s.act(now, ctx))
    }

    fn receive(&mut self, item: Item, now: Ticks) -> Result<Position, EntityError> {
        dispatch!(self, s => s.receive(item, now))
    }

    fn release(&mut self, item: &str, now: Ticks) -> Result<Item, EntityError> {
        dispatch!(self, s => s.release(item, now))
    }

    fn ready_items(&self) -> Vec<&Item> {
        dispatch!(self, s => s.ready_items())
    }

    fn clear(&mut self) {
        dispatch!(self, s => s.clear())
    }
}
