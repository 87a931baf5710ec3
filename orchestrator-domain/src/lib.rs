// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain layer for the adaptive resource-management control plane.
//!
//! Pure business logic: entities, value objects, capability ports, and the
//! domain error type. No tokio runtime, no database driver, no HTTP
//! client — only `async-trait` at the capability-port boundary, so the
//! ports can be awaited by infrastructure without the domain crate itself
//! depending on an executor.

pub mod bottleneck;
pub mod error;
pub mod events;
pub mod forecast;
pub mod ids;
pub mod job;
pub mod limits;
pub mod plan;
pub mod ports;
pub mod profile;
pub mod sample;
pub mod value_objects;
pub mod violation;

pub use error::OrchestratorError;
