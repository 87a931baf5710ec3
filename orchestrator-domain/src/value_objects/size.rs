// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Type-safe byte quantities for the three resource dimensions the Enforcer
//! tracks in bytes: memory, storage, and network transfer. A phantom marker
//! prevents a memory figure from being compared against a storage figure at
//! compile time, while all three share one implementation.

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct GenericSize<T> {
    bytes: u64,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct MemorySizeMarker;
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct StorageSizeMarker;
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NetworkSizeMarker;

pub type MemorySize = GenericSize<MemorySizeMarker>;
pub type StorageSize = GenericSize<StorageSizeMarker>;
pub type NetworkSize = GenericSize<NetworkSizeMarker>;

pub trait SizeCategory {
    fn category_name() -> &'static str;
    fn max_size() -> u64;

    fn validate_size(bytes: u64) -> Result<(), OrchestratorError> {
        if bytes > Self::max_size() {
            return Err(OrchestratorError::invalid_limits(format!(
                "{} size {} exceeds maximum allowed {}",
                Self::category_name(),
                bytes,
                Self::max_size()
            )));
        }
        Ok(())
    }
}

impl SizeCategory for MemorySizeMarker {
    fn category_name() -> &'static str {
        "memory"
    }
    fn max_size() -> u64 {
        1024 * 1024 * 1024 * 1024 // 1 TB
    }
}

impl SizeCategory for StorageSizeMarker {
    fn category_name() -> &'static str {
        "storage"
    }
    fn max_size() -> u64 {
        u64::MAX
    }
}

impl SizeCategory for NetworkSizeMarker {
    fn category_name() -> &'static str {
        "network"
    }
    fn max_size() -> u64 {
        100 * 1024 * 1024 * 1024 // 100 GB/s ceiling, a generous bound on any real NIC
    }
}

impl<T: SizeCategory> GenericSize<T> {
    pub fn new(bytes: u64) -> Result<Self, OrchestratorError> {
        T::validate_size(bytes)?;
        Ok(Self { bytes, _marker: PhantomData })
    }

    pub fn zero() -> Self {
        Self { bytes: 0, _marker: PhantomData }
    }

    pub fn from_mb(mb: u64) -> Result<Self, OrchestratorError> {
        let bytes = mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| OrchestratorError::invalid_limits("megabyte value too large"))?;
        Self::new(bytes)
    }

    pub fn from_gb(gb: u64) -> Result<Self, OrchestratorError> {
        let bytes = gb
            .checked_mul(1024 * 1024 * 1024)
            .ok_or_else(|| OrchestratorError::invalid_limits("gigabyte value too large"))?;
        Self::new(bytes)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn category(&self) -> &'static str {
        T::category_name()
    }

    pub fn as_mb_f64(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn as_gb_f64(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == 0
    }

    pub fn human_readable(&self) -> String {
        if self.bytes >= 1024 * 1024 * 1024 {
            format!("{:.2} GB", self.as_gb_f64())
        } else if self.bytes >= 1024 * 1024 {
            format!("{:.2} MB", self.as_mb_f64())
        } else if self.bytes >= 1024 {
            format!("{:.2} KB", self.bytes as f64 / 1024.0)
        } else {
            format!("{} bytes", self.bytes)
        }
    }

    /// Rounds up to the next 1 GB multiple. Used when materializing a
    /// Resource Limit Record from a predicted quantity, per the admission
    /// scenario's 1 GB grid.
    pub fn round_up_to_gb(&self) -> Self {
        let gb = 1024u64 * 1024 * 1024;
        let rounded = self.bytes.div_ceil(gb) * gb;
        Self { bytes: rounded, _marker: PhantomData }
    }

    pub fn checked_add(&self, other: Self) -> Result<Self, OrchestratorError> {
        let result = self
            .bytes
            .checked_add(other.bytes)
            .ok_or_else(|| OrchestratorError::invalid_limits("size addition would overflow"))?;
        Self::new(result)
    }

    pub fn checked_sub(&self, other: Self) -> Result<Self, OrchestratorError> {
        let result = self
            .bytes
            .checked_sub(other.bytes)
            .ok_or_else(|| OrchestratorError::invalid_limits("size subtraction would underflow"))?;
        Self::new(result)
    }
}

impl<T: SizeCategory> Add for GenericSize<T> {
    type Output = GenericSize<T>;
    fn add(self, rhs: GenericSize<T>) -> Self::Output {
        GenericSize { bytes: self.bytes + rhs.bytes, _marker: PhantomData }
    }
}

impl<T: SizeCategory> Sub for GenericSize<T> {
    type Output = GenericSize<T>;
    fn sub(self, rhs: GenericSize<T>) -> Self::Output {
        GenericSize { bytes: self.bytes.saturating_sub(rhs.bytes), _marker: PhantomData }
    }
}

impl<T: SizeCategory> Default for GenericSize<T> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<T: SizeCategory> Display for GenericSize<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.human_readable(), T::category_name())
    }
}

impl<T> From<u64> for GenericSize<T> {
    fn from(bytes: u64) -> Self {
        Self { bytes, _marker: PhantomData }
    }
}

impl<T> From<GenericSize<T>> for u64 {
    fn from(size: GenericSize<T>) -> Self {
        size.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_1200_mb_up_to_the_1_gb_grid() {
        let predicted = MemorySize::from_mb(1200).unwrap();
        let rounded = predicted.round_up_to_gb();
        assert_eq!(rounded.bytes(), 1024 * 1024 * 1024 * 2);
    }

    #[test]
    fn rejects_memory_size_over_category_maximum() {
        assert!(MemorySize::new(2 * 1024 * 1024 * 1024 * 1024).is_err());
    }

    #[test]
    fn checked_sub_rejects_underflow() {
        let a = StorageSize::from_gb(1).unwrap();
        let b = StorageSize::from_gb(2).unwrap();
        assert!(a.checked_sub(b).is_err());
    }
}
