#![cfg_attr(not(feature = "std"), no_std)]

//! # Thermal Control Primitives
//!
//! `thermal` provides the small numeric core of a heater control system:
//! a PID controller with conditional-integration anti-windup, and a
//! hard-limit check for temperatures that must never be crossed regardless
//! of setpoint or mode. Both are allocation-free and generic over any
//! `num_traits::Float`, so they're usable on embedded targets as well as a
//! host-side control process.
//!
//! - **PID Controller**: see [`pid::Pid`].
//! - **Hard Limit**: see [`safety::HardLimit`].
//! - **`no_std` support**: can be used in bare-metal environments.
//! - **Optional `serde` support**: for serializing/deserializing controller state.

pub mod pid;
pub mod safety;

pub use pid::Pid;
pub use safety::HardLimit;
