// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Generic typed identifier built on a ULID, parameterized by a zero-sized
//! marker type so that `JobId` and `HostId` cannot be swapped at compile
//! time even though both wrap the same underlying value.

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use ulid::Ulid;

/// Per-category behavior for a `GenericId`. Implemented by marker types.
pub trait IdCategory {
    /// Short, human-readable name used in `Display`/logging contexts.
    fn category_name() -> &'static str;
}

/// A ULID wrapped with a phantom marker type identifying what it names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenericId<T> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdCategory> GenericId<T> {
    /// Generates a new, time-ordered id.
    pub fn new() -> Self {
        Self { ulid: Ulid::new(), _marker: PhantomData }
    }

    pub fn nil() -> Self {
        Self { ulid: Ulid::nil(), _marker: PhantomData }
    }

    pub fn from_ulid(ulid: Ulid) -> Result<Self, OrchestratorError> {
        Ok(Self { ulid, _marker: PhantomData })
    }

    pub fn from_string(s: &str) -> Result<Self, OrchestratorError> {
        let ulid = Ulid::from_string(s)
            .map_err(|e| OrchestratorError::validation(format!("invalid {} id {:?}: {e}", T::category_name(), s)))?;
        Ok(Self { ulid, _marker: PhantomData })
    }

    /// Builds a boundary id for time-range queries: the smallest id whose
    /// timestamp component is `timestamp_ms`.
    pub fn from_timestamp_ms(timestamp_ms: u64) -> Result<Self, OrchestratorError> {
        let ulid = Ulid::from_parts(timestamp_ms, 0);
        Ok(Self { ulid, _marker: PhantomData })
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.ulid.timestamp_ms()
    }

    pub fn datetime(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.timestamp_ms() as i64).unwrap_or_else(chrono::Utc::now)
    }

    pub fn is_nil(&self) -> bool {
        self.ulid == Ulid::nil()
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PartialEq for GenericId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}
impl<T> Eq for GenericId<T> {}

impl<T> PartialOrd for GenericId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.ulid.cmp(&other.ulid))
    }
}
impl<T> Ord for GenericId<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T> Hash for GenericId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ulid)
    }
}

impl<T> From<Ulid> for GenericId<T> {
    fn from(ulid: Ulid) -> Self {
        Self { ulid, _marker: PhantomData }
    }
}

impl<T> From<GenericId<T>> for Ulid {
    fn from(id: GenericId<T>) -> Self {
        id.ulid
    }
}

/// Declares a typed id newtype over `GenericId<Marker>`: `new`, `from_ulid`,
/// `from_string`, `timestamp_ms`, `datetime`, `Display`, serde, and a marker
/// type whose name doubles as the category label.
macro_rules! typed_id {
    ($id:ident, $marker:ident, $category:literal) => {
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub struct $marker;

        impl IdCategory for $marker {
            fn category_name() -> &'static str {
                $category
            }
        }

        #[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub struct $id($crate::ids::GenericId<$marker>);

        impl $id {
            pub fn new() -> Self {
                Self($crate::ids::GenericId::new())
            }

            pub fn nil() -> Self {
                Self($crate::ids::GenericId::nil())
            }

            pub fn from_ulid(ulid: Ulid) -> Result<Self, OrchestratorError> {
                Ok(Self($crate::ids::GenericId::from_ulid(ulid)?))
            }

            pub fn from_string(s: &str) -> Result<Self, OrchestratorError> {
                Ok(Self($crate::ids::GenericId::from_string(s)?))
            }

            pub fn from_timestamp_ms(timestamp_ms: u64) -> Self {
                Self($crate::ids::GenericId::from_timestamp_ms(timestamp_ms).unwrap_or_default())
            }

            pub fn as_ulid(&self) -> Ulid {
                self.0.as_ulid()
            }

            pub fn timestamp_ms(&self) -> u64 {
                self.0.timestamp_ms()
            }

            pub fn datetime(&self) -> chrono::DateTime<chrono::Utc> {
                self.0.datetime()
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $id {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $id {
            type Err = OrchestratorError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_string(s)
            }
        }

        impl From<Ulid> for $id {
            fn from(ulid: Ulid) -> Self {
                Self($crate::ids::GenericId::from(ulid))
            }
        }

        impl From<$id> for Ulid {
            fn from(id: $id) -> Self {
                id.0.into()
            }
        }
    };
}

typed_id!(JobId, JobMarker, "job");
typed_id!(ContainerId, ContainerMarker, "container");
typed_id!(HostId, HostMarker, "host");
typed_id!(ExecutionId, ExecutionMarker, "execution");
typed_id!(ViolationId, ViolationMarker, "violation");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id = JobId::new();
        let parsed = JobId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn different_marker_types_do_not_mix() {
        // This is a compile-time property; the test documents it still
        // compares equal only to its own category.
        let job = JobId::new();
        let host = HostId::from_ulid(job.as_ulid()).unwrap();
        assert_eq!(job.as_ulid(), host.as_ulid());
    }

    #[test]
    fn ids_generated_later_sort_after_earlier_ones() {
        let earlier = JobId::from_timestamp_ms(1_000);
        let later = JobId::from_timestamp_ms(2_000);
        assert!(earlier < later);
    }

    #[test]
    fn nil_id_is_nil() {
        assert!(JobId::nil().is_nil());
        assert!(!JobId::new().is_nil());
    }
}
