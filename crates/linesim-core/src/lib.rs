//! Linesim Core -- a discrete-event engine for production lines.
//!
//! Work items enter from sources on a preloaded schedule, queue in buffers,
//! occupy processor stations for a fixed duration and end in sinks. Time
//! jumps from event to event; whenever a station holds an item that could
//! move, the run stops at a decision point so a scheduling rule (or an
//! external driver) can choose which item goes where.
//!
//! # Check / Act / Flow Cycle
//!
//! Each pass of [`scene::Scene`] at the current time:
//!
//! 1. **Check** -- every station reports the earliest time it could next
//!    have an item ready; future times go into the pending-time set.
//! 2. **Act** -- due stations update their bookkeeping (finishing processes,
//!    releasing arrivals) and the first one with an item ready to move
//!    becomes the decision point.
//! 3. **Flow** -- the decision moves one item from that station to a wired
//!    downstream station with spare capacity.
//! 4. **Advance** -- when nothing is ready, the clock jumps to the earliest
//!    pending time.
//!
//! # Driving a Scene
//!
//! ```rust,ignore
//! let mut scene = Scene::new();
//! scene.add_source("S", schedule)?;
//! scene.add_processor("P", ProcessorConfig::new("drill"))?;
//! scene.add_sink("K")?;
//! scene.connect("S", "P")?;
//! scene.connect("P", "K")?;
//!
//! // Automatic: a rule resolves every decision.
//! scene.run(policy::fifo)?;
//!
//! // Manual: stop at each decision point.
//! let mut outcome = scene.run_manual()?;
//! while let RunOutcome::Decision { entity, .. } = &outcome {
//!     let decision = choose(&scene, entity);
//!     outcome = scene.resume(decision)?;
//! }
//! ```
//!
//! # Key Types
//!
//! - [`scene::Scene`] -- Orchestrator: topology, clock, decision protocol.
//! - [`graph::FlowGraph`] -- Arena of stations and the port-wired links
//!   between them.
//! - [`station::Station`] -- Source, Buffer, Processor and Sink behind the
//!   [`entity::Entity`] contract.
//! - [`item::Item`] -- A unit of work with one [`item::ProcessRecord`] per
//!   process.
//! - [`workload::Schedule`] -- Arrival and duration data consumed by sources.
//! - [`event::EventLog`] -- Chronological observer feed.
//! - [`replay::DecisionLog`] -- Recorded decisions, replayable via bitcode.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic ratios.

pub mod buffer;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod entity;
pub mod event;
pub mod fixed;
pub mod graph;
pub mod id;
pub mod item;
pub mod policy;
pub mod ports;
pub mod processor;
pub mod replay;
pub mod rng;
pub mod scene;
pub mod sim;
pub mod sink;
pub mod source;
pub mod station;
pub mod validation;
pub mod workload;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
