//! Resource vectors
//!
//! Additive, comparable vectors over the cluster's resource dimensions:
//! cpu cores, memory bytes, and any named scalar extensions (gpus,
//! ephemeral storage, ...).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::error;

/// Additive resource vector.
///
/// Arithmetic is total over non-negative operands. Subtracting more than a
/// component holds is a caller bug: the component is clamped to zero and the
/// violation is logged at error level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub cpu_cores: f64,
    pub memory_bytes: f64,
    /// Extended scalar dimensions keyed by resource name.
    pub scalars: BTreeMap<String, f64>,
}

impl Resource {
    /// The zero vector.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(cpu_cores: f64, memory_bytes: f64) -> Self {
        Self {
            cpu_cores,
            memory_bytes,
            scalars: BTreeMap::new(),
        }
    }

    /// Add a named scalar dimension.
    pub fn with_scalar(mut self, name: impl Into<String>, quantity: f64) -> Self {
        self.scalars.insert(name.into(), quantity);
        self
    }

    pub fn scalar(&self, name: &str) -> f64 {
        self.scalars.get(name).copied().unwrap_or(0.0)
    }

    /// Componentwise in-place addition.
    pub fn add(&mut self, other: &Resource) -> &mut Self {
        self.cpu_cores += other.cpu_cores;
        self.memory_bytes += other.memory_bytes;
        for (name, quantity) in &other.scalars {
            *self.scalars.entry(name.clone()).or_insert(0.0) += quantity;
        }
        self
    }

    /// Componentwise in-place subtraction.
    ///
    /// Legal call sequences never subtract below zero; if one does, the
    /// component clamps to zero so the accounting stays usable for the rest
    /// of the round.
    pub fn sub(&mut self, other: &Resource) -> &mut Self {
        self.cpu_cores = sub_component(self.cpu_cores, other.cpu_cores, "cpu");
        self.memory_bytes = sub_component(self.memory_bytes, other.memory_bytes, "memory");
        for (name, quantity) in &other.scalars {
            let current = self.scalars.entry(name.clone()).or_insert(0.0);
            *current = sub_component(*current, *quantity, name);
        }
        self
    }

    /// Componentwise `<=`, the fit check used by allocation.
    pub fn less_equal(&self, other: &Resource) -> bool {
        if self.cpu_cores > other.cpu_cores || self.memory_bytes > other.memory_bytes {
            return false;
        }
        self.scalars
            .iter()
            .all(|(name, quantity)| *quantity <= other.scalar(name))
    }
}

fn sub_component(current: f64, delta: f64, dimension: &str) -> f64 {
    if delta > current {
        error!(
            dimension,
            current, delta, "resource underflow, clamping to zero"
        );
        return 0.0;
    }
    current - delta
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu {}, memory {}", self.cpu_cores, self.memory_bytes)?;
        for (name, quantity) in &self.scalars {
            write!(f, ", {} {}", name, quantity)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sub_roundtrip() {
        let mut res = Resource::new(4.0, 8_000_000_000.0).with_scalar("nvidia.com/gpu", 2.0);
        let delta = Resource::new(1.0, 2_000_000_000.0).with_scalar("nvidia.com/gpu", 1.0);

        let before = res.clone();
        res.add(&delta);
        res.sub(&delta);

        assert_eq!(res, before);
    }

    #[test]
    fn test_sub_clamps_on_underflow() {
        let mut res = Resource::new(1.0, 100.0);
        res.sub(&Resource::new(2.0, 50.0));

        assert_eq!(res.cpu_cores, 0.0);
        assert_eq!(res.memory_bytes, 50.0);
    }

    #[test]
    fn test_less_equal() {
        let small = Resource::new(2.0, 100.0);
        let large = Resource::new(4.0, 200.0);

        assert!(small.less_equal(&large));
        assert!(!large.less_equal(&small));
        assert!(small.less_equal(&small));
    }

    #[test]
    fn test_less_equal_scalars() {
        let with_gpu = Resource::new(1.0, 100.0).with_scalar("nvidia.com/gpu", 1.0);
        let without_gpu = Resource::new(4.0, 400.0);

        assert!(!with_gpu.less_equal(&without_gpu));
        assert!(with_gpu.less_equal(&Resource::new(1.0, 100.0).with_scalar("nvidia.com/gpu", 2.0)));
    }

    #[test]
    fn test_empty_is_zero() {
        let empty = Resource::empty();
        assert!(empty.less_equal(&Resource::new(0.0, 0.0)));
        assert_eq!(empty, Resource::default());
    }
}
