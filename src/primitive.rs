//! # Primitive Catalogue
//!
//! The set of communication primitives a driver knows how to time, together
//! with the naming lookup table the harness needs to talk to drivers that
//! spell routine names differently, and the message-size specification used
//! by the data-movement primitives.
//!
//! Two spellings exist for every primitive:
//!
//! - the short CLI name (`barrier`, `atomic-cmp-swp`, `get`, ...) spoken by
//!   drivers that follow the standard argument style, and
//! - the routine name (`shmem_barrier_all`, `shmem_atomic_compare_swap`, ...)
//!   spoken by the legacy suite.
//!
//! Reports label rows and name files by the CLI name. Configuration files
//! may use either spelling.

use crate::error::{HarnessError, HarnessResult};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a primitive yields a single latency or a per-size sweep
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    LatencyOnly,
    BandwidthSweep,
}

/// A timed communication primitive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Primitive {
    /// Collective barrier across all peers
    #[value(alias = "shmem_barrier_all")]
    Barrier,
    /// Remote atomic fetch
    #[value(alias = "shmem_atomic_fetch")]
    AtomicFetch,
    /// Remote atomic add
    #[value(alias = "shmem_atomic_add")]
    AtomicAdd,
    /// Remote atomic compare-and-swap
    #[value(name = "atomic-cmp-swp", aliases = ["atomic-compare-swap", "shmem_atomic_compare_swap"])]
    AtomicCmpSwp,
    /// Remote atomic increment
    #[value(name = "atomic-inc", aliases = ["atomic-increment", "shmem_atomic_inc"])]
    AtomicInc,
    /// Remote atomic swap
    #[value(alias = "shmem_atomic_swap")]
    AtomicSwap,
    /// Remote atomic set
    #[value(alias = "shmem_atomic_set")]
    AtomicSet,
    /// Blocking bulk get
    #[value(alias = "shmem_get")]
    Get,
    /// Blocking bulk put
    #[value(alias = "shmem_put")]
    Put,
    /// Non-blocking bulk get, completed by quiet
    #[value(alias = "shmem_get_nbi")]
    GetNbi,
    /// Non-blocking bulk put, completed by quiet
    #[value(alias = "shmem_put_nbi")]
    PutNbi,
}

impl Primitive {
    pub const ALL: [Primitive; 11] = [
        Primitive::Barrier,
        Primitive::AtomicFetch,
        Primitive::AtomicAdd,
        Primitive::AtomicCmpSwp,
        Primitive::AtomicInc,
        Primitive::AtomicSwap,
        Primitive::AtomicSet,
        Primitive::Get,
        Primitive::Put,
        Primitive::GetNbi,
        Primitive::PutNbi,
    ];

    pub fn category(self) -> Category {
        match self {
            Primitive::Get | Primitive::Put | Primitive::GetNbi | Primitive::PutNbi => {
                Category::BandwidthSweep
            }
            _ => Category::LatencyOnly,
        }
    }

    pub fn uses_msg_size(self) -> bool {
        self.category() == Category::BandwidthSweep
    }

    /// Name understood by drivers using the standard argument style; also
    /// the report row label and the `bw_<name>.csv` file stem.
    pub fn cli_name(self) -> &'static str {
        match self {
            Primitive::Barrier => "barrier",
            Primitive::AtomicFetch => "atomic-fetch",
            Primitive::AtomicAdd => "atomic-add",
            Primitive::AtomicCmpSwp => "atomic-cmp-swp",
            Primitive::AtomicInc => "atomic-inc",
            Primitive::AtomicSwap => "atomic-swap",
            Primitive::AtomicSet => "atomic-set",
            Primitive::Get => "get",
            Primitive::Put => "put",
            Primitive::GetNbi => "get-nbi",
            Primitive::PutNbi => "put-nbi",
        }
    }

    /// Routine name passed to drivers using the legacy argument style.
    pub fn routine_name(self) -> &'static str {
        match self {
            Primitive::Barrier => "shmem_barrier_all",
            Primitive::AtomicFetch => "shmem_atomic_fetch",
            Primitive::AtomicAdd => "shmem_atomic_add",
            Primitive::AtomicCmpSwp => "shmem_atomic_compare_swap",
            Primitive::AtomicInc => "shmem_atomic_inc",
            Primitive::AtomicSwap => "shmem_atomic_swap",
            Primitive::AtomicSet => "shmem_atomic_set",
            Primitive::Get => "shmem_get",
            Primitive::Put => "shmem_put",
            Primitive::GetNbi => "shmem_get_nbi",
            Primitive::PutNbi => "shmem_put_nbi",
        }
    }

    /// Human label used in the driver's result line ("Avg Time per ...").
    pub fn operation_label(self) -> &'static str {
        match self {
            Primitive::Barrier => "Barrier",
            Primitive::AtomicFetch => "Fetch",
            Primitive::AtomicAdd => "Add",
            Primitive::AtomicCmpSwp => "Compare+Swap",
            Primitive::AtomicInc => "Increment",
            Primitive::AtomicSwap => "Swap",
            Primitive::AtomicSet => "Set",
            Primitive::Get => "Get",
            Primitive::Put => "Put",
            Primitive::GetNbi => "Get (nbi)",
            Primitive::PutNbi => "Put (nbi)",
        }
    }

    fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|p| p.cli_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for Primitive {
    type Err = HarnessError;

    /// Accepts either spelling, plus the long aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        match needle.as_str() {
            "atomic-compare-swap" => return Ok(Primitive::AtomicCmpSwp),
            "atomic-increment" => return Ok(Primitive::AtomicInc),
            _ => {}
        }
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.cli_name() == needle || p.routine_name() == needle)
            .ok_or_else(|| HarnessError::UnknownPrimitive {
                name: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

impl<'de> Deserialize<'de> for Primitive {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// How a data-movement primitive's message sizes are chosen
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MsgSizeSpec {
    /// Powers of two from 1 up to and including the maximum
    Max(usize),
    /// Explicit sizes, used in the given order
    List(Vec<usize>),
    /// Doubling from `min` while not exceeding `max` (legacy `--min/--max`)
    Range { min: usize, max: usize },
}

impl MsgSizeSpec {
    /// Build a size set from the mutually exclusive size options.
    ///
    /// `--min`/`--max` together count as one option. Returns `Ok(None)` when
    /// nothing is given so callers can pick their own default.
    pub fn from_options(
        max: Option<usize>,
        list: Option<Vec<usize>>,
        range_min: Option<usize>,
        range_max: Option<usize>,
    ) -> HarnessResult<Option<Self>> {
        let has_range = range_min.is_some() || range_max.is_some();
        let given = [max.is_some(), list.is_some(), has_range]
            .iter()
            .filter(|&&g| g)
            .count();
        if given > 1 {
            return Err(HarnessError::InvalidConfig(
                "--msg-size-max, --msg-sizes and --min/--max are mutually exclusive".to_string(),
            ));
        }

        Ok(match (max, list) {
            (Some(max), _) => Some(MsgSizeSpec::Max(max)),
            (_, Some(list)) => Some(MsgSizeSpec::List(list)),
            _ if has_range => Some(MsgSizeSpec::Range {
                min: range_min.unwrap_or(1),
                max: range_max.unwrap_or(crate::defaults::DRIVER_MSG_SIZE_MAX),
            }),
            _ => None,
        })
    }

    /// Expand into the concrete size sequence, rejecting empty or zero sizes.
    pub fn sizes(&self) -> HarnessResult<Vec<usize>> {
        let sizes = match self {
            MsgSizeSpec::Max(max) => powers_of_two(*max),
            MsgSizeSpec::List(list) => list.clone(),
            MsgSizeSpec::Range { min, max } => {
                std::iter::successors(Some((*min).max(1)), |x| x.checked_mul(2))
                    .take_while(|x| x <= max)
                    .collect()
            }
        };
        if sizes.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "no message sizes specified; --msg-size-max must be at least 1".to_string(),
            ));
        }
        if sizes.contains(&0) {
            return Err(HarnessError::InvalidConfig(
                "message sizes must be at least 1 byte".to_string(),
            ));
        }
        Ok(sizes)
    }
}

impl Default for MsgSizeSpec {
    fn default() -> Self {
        MsgSizeSpec::Max(crate::defaults::DRIVER_MSG_SIZE_MAX)
    }
}

/// Powers of two from 1 up to and including `max`.
pub fn powers_of_two(max: usize) -> Vec<usize> {
    std::iter::successors(Some(1usize), |x| x.checked_mul(2))
        .take_while(|&x| x <= max)
        .collect()
}
