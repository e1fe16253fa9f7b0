//! Pipeline Configuration
//!
//! Shard-count limits and the tunables shared by every encode, decode and
//! repair operation. A [`PipelineConfig`] can be built in code or loaded
//! from YAML/JSON; every field has a default.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Limits
// =============================================================================

/// Maximum number of data shards (k)
pub const MAX_DATA_SHARDS: usize = 32;

/// Maximum number of parity shards (m)
pub const MAX_PARITY_SHARDS: usize = 32;

/// Maximum k + m. Bounded by the width of the lane bitmask.
pub const MAX_TOTAL_SHARDS: usize = 64;

/// Stripe sizes are always a multiple of this many bytes.
pub const STRIPE_ALIGNMENT: usize = 8;

/// Default channel buffering ceiling: the largest single buffer a lane
/// may be asked to hold for one stripe.
pub const DEFAULT_BUFFER_CEILING: usize = (1 << 31) - 1;

/// Stripe size hint used when callers pass 0.
pub const DEFAULT_STRIPE_SIZE: u32 = 64 * 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for encode/decode/repair pipelines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Channel buffering ceiling in bytes; `max(k, m) * stripe_size` never
    /// exceeds it.
    pub buffer_ceiling: usize,

    /// Stripe size hint applied when an operation is started with a hint
    /// of 0
    pub default_stripe_size: u32,

    /// Run the coding primitive on the blocking worker pool instead of
    /// inline on the driver task
    pub offload_coding: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_ceiling: DEFAULT_BUFFER_CEILING,
            default_stripe_size: DEFAULT_STRIPE_SIZE,
            offload_coding: true,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid YAML pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid JSON pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let floor = STRIPE_ALIGNMENT * MAX_DATA_SHARDS.max(MAX_PARITY_SHARDS);
        if self.buffer_ceiling < floor {
            return Err(Error::Config(format!(
                "bufferCeiling must be >= {} bytes, got {}",
                floor, self.buffer_ceiling
            )));
        }
        if self.default_stripe_size == 0
            || self.default_stripe_size as usize % STRIPE_ALIGNMENT != 0
        {
            return Err(Error::Config(format!(
                "defaultStripeSize must be a non-zero multiple of {}, got {}",
                STRIPE_ALIGNMENT, self.default_stripe_size
            )));
        }
        Ok(())
    }
}

/// Check k and m against the supported range.
pub fn validate_shard_counts(data_shards: usize, parity_shards: usize) -> Result<()> {
    if data_shards == 0 || data_shards > MAX_DATA_SHARDS {
        return Err(Error::ContractViolation(format!(
            "data shards must be in 1..={}, got {}",
            MAX_DATA_SHARDS, data_shards
        )));
    }
    if parity_shards == 0 || parity_shards > MAX_PARITY_SHARDS {
        return Err(Error::ContractViolation(format!(
            "parity shards must be in 1..={}, got {}",
            MAX_PARITY_SHARDS, parity_shards
        )));
    }
    if data_shards + parity_shards > MAX_TOTAL_SHARDS {
        return Err(Error::ContractViolation(format!(
            "total shards must be <= {}, got {}",
            MAX_TOTAL_SHARDS,
            data_shards + parity_shards
        )));
    }
    Ok(())
}
