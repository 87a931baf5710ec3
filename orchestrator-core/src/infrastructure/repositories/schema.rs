// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Schema for the control plane's single key-value table. One row per
//! persisted key (`/profiles/<jobClass>`, `/history/executions/<t>`,
//! `/baselines/<metric>`); the value column holds the caller's serialized
//! bytes opaquely.

pub const CREATE_KV_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orchestrator_kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

pub const CREATE_KV_PREFIX_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_orchestrator_kv_key ON orchestrator_kv(key)
"#;
