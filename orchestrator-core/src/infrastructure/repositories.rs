// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence: a single key-value table backing `/profiles/<jobClass>`,
//! `/history/executions/<t>`, and `/baselines/<metric>`, following the
//! teacher's `SqliteRepository<T>` shape (generic store, JSON payload
//! column, connection pool) but collapsed to raw bytes since the
//! `Persistence` port is key-value, not entity-typed.

pub mod schema;
pub mod sqlite_persistence;

pub use sqlite_persistence::SqlitePersistence;
