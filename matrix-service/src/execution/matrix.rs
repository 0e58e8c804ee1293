// Matrix Expansion
// Expands declared axes into concrete job configurations

use crate::error::ConfigurationError;
use crate::workflow::models::{Axis, ToolchainAxis, ToolchainSelection};

use indexmap::IndexMap;
use serde::Serialize;

use std::collections::HashSet;

/// One concrete combination of axis values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobConfig {
    /// Position in expansion order
    pub index: usize,
    /// One value per axis, in axis declaration order
    pub values: IndexMap<String, String>,
    /// Toolchain derived from the toolchain axis
    pub toolchain: ToolchainSelection,
}

impl JobConfig {
    /// Value assigned to an axis
    pub fn value(&self, axis: &str) -> Option<&str> {
        self.values.get(axis).map(String::as_str)
    }

    /// Human-readable name, e.g. `backend=openssl, features=, toolchain=nightly`
    pub fn name(&self) -> String {
        self.values
            .iter()
            .map(|(axis, value)| format!("{}={}", axis, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Matrix expander for axis declarations
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand axes into their full cartesian product.
    ///
    /// The first axis varies slowest and the last-declared axis fastest, so
    /// the same declaration always yields the same order.
    pub fn expand(
        axes: &[Axis],
        toolchain: Option<&ToolchainAxis>,
    ) -> Result<Vec<JobConfig>, ConfigurationError> {
        Self::validate(axes, toolchain)?;

        let total = Self::job_count(axes)?;
        let jobs: Vec<JobConfig> = (0..total)
            .map(|index| Self::job_at(axes, toolchain, index))
            .collect();

        tracing::debug!(axes = axes.len(), jobs = jobs.len(), "expanded matrix");
        Ok(jobs)
    }

    /// Check axis declarations without expanding them
    pub fn validate(
        axes: &[Axis],
        toolchain: Option<&ToolchainAxis>,
    ) -> Result<(), ConfigurationError> {
        if axes.is_empty() {
            return Err(ConfigurationError::NoAxes);
        }

        for axis in axes {
            if axis.values.is_empty() {
                return Err(ConfigurationError::EmptyAxis {
                    axis: axis.name.clone(),
                });
            }

            let mut seen = HashSet::new();
            for value in &axis.values {
                if !seen.insert(value.as_str()) {
                    return Err(ConfigurationError::DuplicateAxisValue {
                        axis: axis.name.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        if let Some(toolchain) = toolchain {
            let axis = axes
                .iter()
                .find(|a| a.name == toolchain.axis)
                .ok_or_else(|| ConfigurationError::UnknownToolchainAxis {
                    axis: toolchain.axis.clone(),
                })?;

            if !axis.values.contains(&toolchain.pinned) {
                return Err(ConfigurationError::UnknownPinnedValue {
                    axis: toolchain.axis.clone(),
                    value: toolchain.pinned.clone(),
                });
            }
        }

        Ok(())
    }

    /// Product of axis cardinalities
    pub fn job_count(axes: &[Axis]) -> Result<usize, ConfigurationError> {
        axes.iter().try_fold(1usize, |acc, axis| {
            acc.checked_mul(axis.values.len())
                .ok_or(ConfigurationError::MatrixTooLarge)
        })
    }

    /// Decode an expansion index into one value per axis (mixed radix, last axis fastest)
    fn job_at(axes: &[Axis], toolchain: Option<&ToolchainAxis>, index: usize) -> JobConfig {
        let mut picks = vec![0usize; axes.len()];
        let mut remainder = index;
        for (slot, axis) in axes.iter().enumerate().rev() {
            picks[slot] = remainder % axis.values.len();
            remainder /= axis.values.len();
        }

        let values: IndexMap<String, String> = axes
            .iter()
            .zip(&picks)
            .map(|(axis, &pick)| (axis.name.clone(), axis.values[pick].clone()))
            .collect();

        let toolchain = match toolchain {
            Some(tc) if values.get(&tc.axis) == Some(&tc.pinned) => ToolchainSelection::Pinned,
            _ => ToolchainSelection::Stable,
        };

        JobConfig {
            index,
            values,
            toolchain,
        }
    }
}
