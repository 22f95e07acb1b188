//! # airfield-control
//!
//! Takeoff coordinator for the airfield simulation.
//!
//! ## Architecture
//!
//! One coordinator process runs a fixed set of strip workers that contend
//! for a small runway pool:
//! - [`state::AirfieldState`] holds the plane queue and takeoff counters
//!   behind a single mutex
//! - [`runway::RunwayPool`] hands out runways without blocking
//! - [`worker::TakeoffWorker`] is the per-strip loop, bounded by the cap
//! - [`signals`] bridges OS signals to and from the radio process
//! - [`supervisor::Supervisor`] owns one run end to end
//!
//! ## Communication
//!
//! The radio is an external process. Its pid is exchanged through the
//! shared pid segment (`airfield-shm`); everything else travels as signals.

pub mod runway;
pub mod signals;
pub mod state;
pub mod supervisor;
pub mod worker;

pub use runway::{RunwayGuard, RunwayId, RunwayPool};
pub use signals::{ArrivalFeed, Delivery, RadioLink, SegmentRadio, SignalBridge, SignalError};
pub use state::{AirfieldState, Counters, ManualArrivals, Takeoff};
pub use supervisor::{RadioExit, RunSummary, Supervisor, SupervisorError};
pub use worker::{Airfield, Schedule, TakeoffWorker, WorkerReport};
