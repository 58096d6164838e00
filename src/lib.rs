//! CLLC Converter Control Core
//!
//! Real-time control and protection engine for a bidirectional CLLC
//! resonant DC-DC converter. The core regulates voltage or current on either
//! bridge by computing switching period, duty, phase shift and dead-band at
//! interrupt rate, and shuts the power stage down on over-current or
//! over-voltage.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     OPERATOR / SUPERVISOR                    │
//! │  OperatorHandle  │  Supervisor (A / B1 B2 B3)  │  trip log   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    CONTROL ORCHESTRATOR                      │
//! │  UpdateTier  │  ControlTier  │  MonitorTier  │  mailbox      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  ALGORITHMS (pure, no I/O)                   │
//! │  Compensator │ AverageFilter │ SlewLimiter │ Modulation │ SR │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   HAL TRAITS (board crate)                   │
//! │  SensorFrontEnd │ ModulationOutput │ RectifierDriver │ Safe  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows ADC samples → calibration → averaging → physical units →
//! slew-limited reference → compensator → modulation calculator →
//! double-buffered command → compare registers. The trip latch is polled
//! independently and blocks modulation output at every tier.
//!
//! # Design Principles
//!
//! - **Explicit session**: all state lives in a [`control::ControlSession`],
//!   split into one struct per interrupt tier
//! - **Lock-free hand-off**: tiers exchange data through atomics only
//! - **Validated once**: a [`config::ConverterConfig`] that fails validation
//!   never produces a session
//! - **No unsafe**: register access stays behind the [`hal`] traits

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
mod fmt;

#[cfg(feature = "embedded")]
pub use embassy_time;

/// Digital Signal Processing
///
/// Compensator, averaging filter, slew limiter.
pub mod dsp;

/// Modulation Calculator
///
/// Per-unit and nanosecond values to timer ticks.
pub mod modulation;

/// Protection
///
/// Trip latch, fault polling, software limits.
pub mod protection;

/// Synchronous Rectification
///
/// Commanded-vs-active SR mode arbitration.
pub mod rectification;

/// Hardware Abstraction Layer
///
/// Traits a board support crate implements.
pub mod hal;

/// Control Loop Orchestrator
///
/// Session, tiers, operator handle.
pub mod control;

/// Background supervisor
pub mod supervisor;

/// Shared types used across modules
pub mod types;

/// Converter configuration and constants
pub mod config;

/// Prelude module for common imports
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::{ConfigError, ConverterConfig};
    pub use crate::control::{ControlSession, OperatorHandle, SessionParts};
    pub use crate::hal::{
        ModulationOutput, PowerStageHal, RawSamples, RectifierDriver, SafeOutput, SensorFrontEnd,
    };
    pub use crate::modulation::ModulationCommand;
    pub use crate::protection::{FaultLines, TripCause};
    pub use crate::rectification::SrMode;
    pub use crate::types::*;
}
