//! Simulator configuration

use serde::{Deserialize, Serialize};

/// Geometry of one simulated disk unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub tracks: u32,
    pub sectors_per_track: u32,
    pub sector_size: u32,
}

impl Default for DiskSpec {
    fn default() -> Self {
        Self {
            tracks: 16,
            sectors_per_track: 16,
            sector_size: 512,
        }
    }
}

/// Simulated machine layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// One entry per disk unit
    pub disks: Vec<DiskSpec>,
    /// Number of terminal units
    pub terminals: u32,
    /// Clock period; `None` means ticks only happen through `SimHal::tick`
    pub clock_period_ms: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            disks: vec![DiskSpec::default(); 2],
            terminals: 4,
            clock_period_ms: Some(20),
        }
    }
}

impl SimConfig {
    /// Default layout with a manually driven clock
    pub fn manual() -> Self {
        Self {
            clock_period_ms: None,
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
