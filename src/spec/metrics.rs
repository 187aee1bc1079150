//! Static metric registry.
//!
//! One entry per telemetry metric name we understand. Each entry carries the
//! aggregation kind, the unit reported in the output, which raw unit spellings
//! are accepted, and how raw entity identifiers fold into canonical entities.
//!
//! Metrics missing from this table are ignored by the normalizer, so newer
//! telemetry tool versions that add counters do not break a run.

use std::collections::HashMap;

/// GMT reports bytes under several spellings.
pub const BYTES_UNITS: &[&str] = &["Bytes", "bytes", "Byte", "B"];

/// Temperature arrives in hundredths of a degree.
pub const CENTI_CELSIUS_UNITS: &[&str] = &["centi°C"];

pub const ENERGY_UNITS: &[&str] = &["uJ"];
pub const RATIO_UNITS: &[&str] = &["Ratio"];

pub const CONTAINERS: &[&str] = &["rag-app", "ollama"];

/// Canonical alias bucket for temperature sensors that are neither core nor package.
pub const TEMP_IGNORED: &str = "TEMP_IGNORED";

const MICROJOULES_PER_WH: f64 = 3.6e9;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// How samples of a metric are folded and finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    /// Accumulating deltas in microjoules; reports sum and Wh, never a peak.
    Energy,
    /// Ratios and temperatures; reports mean and max.
    RatioMeanMax,
    /// Byte gauges; reports mean (also in MiB) and max.
    BytesMeanMax,
    /// Byte deltas; reports sum (also in MiB) and max.
    BytesSumMax,
}

impl AggKind {
    pub fn tracks_max(self) -> bool {
        !matches!(self, AggKind::Energy)
    }

    pub fn wh_from_uj(sum_uj: f64) -> f64 {
        sum_uj / MICROJOULES_PER_WH
    }

    pub fn mib_from_bytes(bytes: f64) -> f64 {
        bytes / BYTES_PER_MIB
    }
}

/// Substring classification used by the temperature sensors.
#[derive(Debug, Clone, Copy)]
pub struct ContainsClass {
    pub needle: &'static str,
    pub canonical: &'static str,
}

/// How raw entity identifiers map onto canonical entities.
#[derive(Debug, Clone, Copy)]
pub enum EntityRule {
    /// Exactly one raw entity is accepted and reported as `canonical`.
    Exact {
        raw: &'static str,
        canonical: &'static str,
    },
    /// Raw entity passes through unchanged if it is one of the listed names.
    OneOf(&'static [&'static str]),
    /// Every raw entity starting with `prefix` folds into `canonical` (aliased).
    Prefix {
        prefix: &'static str,
        canonical: &'static str,
    },
    /// Every raw entity folds into `canonical` (aliased).
    Any { canonical: &'static str },
    /// First matching substring class wins (aliased); unmatched raw entities
    /// are recorded under `unmatched` and dropped.
    Contains {
        classes: &'static [ContainsClass],
        unmatched: &'static str,
    },
}

impl EntityRule {
    /// Whether a raw entity survives the pre-filter used by `filter`.
    /// Folding rules admit everything so alias auditing still sees every raw id.
    pub fn admits(&self, raw: &str) -> bool {
        match self {
            EntityRule::Exact { raw: expected, .. } => raw == *expected,
            EntityRule::OneOf(names) => names.iter().any(|n| *n == raw),
            EntityRule::Prefix { .. } | EntityRule::Any { .. } | EntityRule::Contains { .. } => {
                true
            }
        }
    }

    /// Canonical names this rule records aliases under.
    pub fn alias_targets(&self) -> Vec<&'static str> {
        match self {
            EntityRule::Exact { .. } | EntityRule::OneOf(_) => vec![],
            EntityRule::Prefix { canonical, .. } | EntityRule::Any { canonical } => {
                vec![*canonical]
            }
            EntityRule::Contains { classes, unmatched } => classes
                .iter()
                .map(|c| c.canonical)
                .chain(std::iter::once(*unmatched))
                .collect(),
        }
    }
}

/// Static per-metric configuration.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub kind: AggKind,
    pub out_unit: &'static str,
    pub accepted_units: &'static [&'static str],
    pub entity_rule: EntityRule,
    /// Raw values are divided by this (1.0 for most metrics).
    pub divisor: f64,
    /// Canonical entities reported for every window, in output order.
    pub out_entities: &'static [&'static str],
}

impl MetricSpec {
    pub fn accepts_unit(&self, unit: &str) -> bool {
        self.accepted_units.iter().any(|u| *u == unit)
    }
}

const TEMP_CLASSES: &[ContainsClass] = &[
    ContainsClass {
        needle: "_Core-",
        canonical: "TEMP_CORE",
    },
    ContainsClass {
        needle: "Package-id",
        canonical: "TEMP_PACK",
    },
];

pub const STANDARD_METRICS: &[MetricSpec] = &[
    MetricSpec {
        name: "cpu_energy_rapl_msr_component",
        kind: AggKind::Energy,
        out_unit: "uJ",
        accepted_units: ENERGY_UNITS,
        entity_rule: EntityRule::Exact {
            raw: "Package_0",
            canonical: "Package_0",
        },
        divisor: 1.0,
        out_entities: &["Package_0"],
    },
    MetricSpec {
        name: "memory_energy_rapl_msr_component",
        kind: AggKind::Energy,
        out_unit: "uJ",
        accepted_units: ENERGY_UNITS,
        entity_rule: EntityRule::Prefix {
            prefix: "DRAM",
            canonical: "DRAM_TOTAL",
        },
        divisor: 1.0,
        out_entities: &["DRAM_TOTAL"],
    },
    MetricSpec {
        name: "gpu_energy_nvidia_nvml_component",
        kind: AggKind::Energy,
        out_unit: "uJ",
        accepted_units: ENERGY_UNITS,
        entity_rule: EntityRule::Any {
            canonical: "GPU_TOTAL",
        },
        divisor: 1.0,
        out_entities: &["GPU_TOTAL"],
    },
    MetricSpec {
        name: "psu_energy_ac_mcp_machine",
        kind: AggKind::Energy,
        out_unit: "uJ",
        accepted_units: ENERGY_UNITS,
        entity_rule: EntityRule::Exact {
            raw: "[MACHINE]",
            canonical: "PSU_TOTAL",
        },
        divisor: 1.0,
        out_entities: &["PSU_TOTAL"],
    },
    MetricSpec {
        name: "cpu_utilization_procfs_system",
        kind: AggKind::RatioMeanMax,
        out_unit: "Ratio",
        accepted_units: RATIO_UNITS,
        entity_rule: EntityRule::Exact {
            raw: "[SYSTEM]",
            canonical: "[SYSTEM]",
        },
        divisor: 1.0,
        out_entities: &["[SYSTEM]"],
    },
    MetricSpec {
        name: "cpu_utilization_cgroup_container",
        kind: AggKind::RatioMeanMax,
        out_unit: "Ratio",
        accepted_units: RATIO_UNITS,
        entity_rule: EntityRule::OneOf(CONTAINERS),
        divisor: 1.0,
        out_entities: CONTAINERS,
    },
    MetricSpec {
        name: "memory_used_cgroup_container",
        kind: AggKind::BytesMeanMax,
        out_unit: "Bytes",
        accepted_units: BYTES_UNITS,
        entity_rule: EntityRule::OneOf(CONTAINERS),
        divisor: 1.0,
        out_entities: CONTAINERS,
    },
    MetricSpec {
        name: "network_io_cgroup_container",
        kind: AggKind::BytesSumMax,
        out_unit: "Bytes",
        accepted_units: BYTES_UNITS,
        entity_rule: EntityRule::OneOf(CONTAINERS),
        divisor: 1.0,
        out_entities: CONTAINERS,
    },
    MetricSpec {
        name: "lmsensors_temperature_component",
        kind: AggKind::RatioMeanMax,
        out_unit: "C",
        accepted_units: CENTI_CELSIUS_UNITS,
        entity_rule: EntityRule::Contains {
            classes: TEMP_CLASSES,
            unmatched: TEMP_IGNORED,
        },
        divisor: 100.0,
        out_entities: &["TEMP_CORE", "TEMP_PACK"],
    },
];

/// Index into [`MetricRegistry::specs`].
pub type MetricId = usize;

/// Name-indexed view over a metric table, built once per run.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    specs: Vec<MetricSpec>,
    by_name: HashMap<&'static str, MetricId>,
}

impl MetricRegistry {
    pub fn new(specs: &[MetricSpec]) -> Self {
        let specs = specs.to_vec();
        let by_name = specs
            .iter()
            .enumerate()
            .map(|(id, spec)| (spec.name, id))
            .collect();
        Self { specs, by_name }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_METRICS)
    }

    pub fn lookup(&self, metric: &str) -> Option<MetricId> {
        self.by_name.get(metric).copied()
    }

    pub fn get(&self, id: MetricId) -> &MetricSpec {
        &self.specs[id]
    }

    pub fn specs(&self) -> &[MetricSpec] {
        &self.specs
    }

    /// Every canonical name some rule records aliases under, sorted and deduped.
    pub fn alias_targets(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = self
            .specs
            .iter()
            .flat_map(|s| s.entity_rule.alias_targets())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
