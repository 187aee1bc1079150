//! Row validation and canonicalization against the metric registry.

use crate::spec::metrics::{EntityRule, MetricId, MetricRegistry};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Raw entity identifiers folded into each canonical entity during one run.
///
/// Audit trail only; aggregation never reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EntityAliasSet(BTreeMap<&'static str, BTreeSet<String>>);

impl EntityAliasSet {
    /// Alias set with an (empty) entry for every canonical name in `targets`.
    pub fn seeded(targets: &[&'static str]) -> Self {
        Self(targets.iter().map(|t| (*t, BTreeSet::new())).collect())
    }

    pub fn record(&mut self, canonical: &'static str, raw: &str) {
        let seen = self.0.entry(canonical).or_default();
        if !seen.contains(raw) {
            seen.insert(raw.to_string());
        }
    }

    #[cfg(test)]
    pub fn get(&self, canonical: &str) -> Option<&BTreeSet<String>> {
        self.0.get(canonical)
    }
}

/// A row that passed its metric's unit and entity rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub metric: MetricId,
    pub entity: &'static str,
    pub value: f64,
}

/// Table-driven normalizer; owns the run's alias set.
pub struct Normalizer<'r> {
    registry: &'r MetricRegistry,
    aliases: EntityAliasSet,
}

impl<'r> Normalizer<'r> {
    pub fn new(registry: &'r MetricRegistry) -> Self {
        Self {
            registry,
            aliases: EntityAliasSet::seeded(&registry.alias_targets()),
        }
    }

    /// Validate a raw tuple and map it to its canonical entity and value.
    ///
    /// Unknown metrics, unexpected units and unexpected entities yield `None`.
    pub fn normalize(
        &mut self,
        metric: &str,
        raw_entity: &str,
        unit: &str,
        value: f64,
    ) -> Option<Normalized> {
        let id = self.registry.lookup(metric)?;
        let spec = self.registry.get(id);

        if !spec.accepts_unit(unit) {
            return None;
        }

        let entity = match spec.entity_rule {
            EntityRule::Exact { raw, canonical } => (raw_entity == raw).then_some(canonical)?,
            EntityRule::OneOf(names) => *names.iter().find(|n| **n == raw_entity)?,
            EntityRule::Prefix { prefix, canonical } => {
                if !raw_entity.starts_with(prefix) {
                    return None;
                }
                self.aliases.record(canonical, raw_entity);
                canonical
            }
            EntityRule::Any { canonical } => {
                self.aliases.record(canonical, raw_entity);
                canonical
            }
            EntityRule::Contains { classes, unmatched } => {
                match classes.iter().find(|c| raw_entity.contains(c.needle)) {
                    Some(class) => {
                        self.aliases.record(class.canonical, raw_entity);
                        class.canonical
                    }
                    None => {
                        self.aliases.record(unmatched, raw_entity);
                        return None;
                    }
                }
            }
        };

        Some(Normalized {
            metric: id,
            entity,
            value: value / spec.divisor,
        })
    }

    pub fn aliases(&self) -> &EntityAliasSet {
        &self.aliases
    }

    pub fn into_aliases(self) -> EntityAliasSet {
        self.aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entity_of(n: Option<Normalized>) -> Option<(&'static str, f64)> {
        n.map(|n| (n.entity, n.value))
    }

    #[test]
    fn exact_rule_checks_entity_and_unit() {
        let reg = MetricRegistry::standard();
        let mut norm = Normalizer::new(&reg);
        let m = "cpu_energy_rapl_msr_component";
        assert_eq!(entity_of(norm.normalize(m, "Package_0", "uJ", 5.0)), Some(("Package_0", 5.0)));
        assert_eq!(entity_of(norm.normalize(m, "Package_1", "uJ", 5.0)), None);
        assert_eq!(entity_of(norm.normalize(m, "Package_0", "mJ", 5.0)), None);

        let psu = "psu_energy_ac_mcp_machine";
        assert_eq!(entity_of(norm.normalize(psu, "[MACHINE]", "uJ", 1.0)), Some(("PSU_TOTAL", 1.0)));
    }

    #[test]
    fn prefix_rule_folds_and_records_aliases() {
        let reg = MetricRegistry::standard();
        let mut norm = Normalizer::new(&reg);
        let m = "memory_energy_rapl_msr_component";
        assert_eq!(entity_of(norm.normalize(m, "DRAM_0", "uJ", 1.0)), Some(("DRAM_TOTAL", 1.0)));
        assert_eq!(entity_of(norm.normalize(m, "DRAM_1", "uJ", 2.0)), Some(("DRAM_TOTAL", 2.0)));
        assert_eq!(entity_of(norm.normalize(m, "DRAM_0", "uJ", 3.0)), Some(("DRAM_TOTAL", 3.0)));
        assert_eq!(entity_of(norm.normalize(m, "Package_0", "uJ", 3.0)), None);

        let raw: Vec<&str> = norm.aliases().get("DRAM_TOTAL").unwrap().iter().map(String::as_str).collect();
        assert_eq!(raw, vec!["DRAM_0", "DRAM_1"]);
    }

    #[test]
    fn byte_units_accept_every_spelling() {
        let reg = MetricRegistry::standard();
        let mut norm = Normalizer::new(&reg);
        for unit in ["Bytes", "bytes", "Byte", "B"] {
            assert_eq!(
                entity_of(norm.normalize("memory_used_cgroup_container", "ollama", unit, 8.0)),
                Some(("ollama", 8.0))
            );
        }
        assert_eq!(
            entity_of(norm.normalize("network_io_cgroup_container", "postgres", "Bytes", 8.0)),
            None
        );
        assert_eq!(
            entity_of(norm.normalize("network_io_cgroup_container", "rag-app", "KB", 8.0)),
            None
        );
    }

    #[test]
    fn temperature_is_rescaled_and_classified() {
        let reg = MetricRegistry::standard();
        let mut norm = Normalizer::new(&reg);
        let m = "lmsensors_temperature_component";
        assert_eq!(
            entity_of(norm.normalize(m, "coretemp-isa-0000_Core-0", "centi°C", 4250.0)),
            Some(("TEMP_CORE", 42.5))
        );
        assert_eq!(
            entity_of(norm.normalize(m, "coretemp-isa-0000_Package-id-0", "centi°C", 5000.0)),
            Some(("TEMP_PACK", 50.0))
        );
        assert_eq!(entity_of(norm.normalize(m, "nvme-pci_Composite", "centi°C", 3000.0)), None);
        assert_eq!(entity_of(norm.normalize(m, "coretemp-isa-0000_Core-0", "C", 42.0)), None);

        let aliases = norm.into_aliases();
        assert!(aliases.get("TEMP_IGNORED").unwrap().contains("nvme-pci_Composite"));
        assert!(aliases.get("TEMP_PACK").unwrap().contains("coretemp-isa-0000_Package-id-0"));
    }

    #[test]
    fn unknown_metric_is_dropped() {
        let reg = MetricRegistry::standard();
        let mut norm = Normalizer::new(&reg);
        assert_eq!(norm.normalize("disk_io_procfs_system", "sda", "Bytes", 1.0), None);
    }

    #[test]
    fn alias_set_is_seeded_for_stable_output() {
        let reg = MetricRegistry::standard();
        let norm = Normalizer::new(&reg);
        let json = serde_json::to_value(norm.aliases()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "DRAM_TOTAL": [], "GPU_TOTAL": [], "TEMP_CORE": [],
                "TEMP_IGNORED": [], "TEMP_PACK": []
            })
        );
    }
}
