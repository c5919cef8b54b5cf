use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    dataset::Schema,
    error::RunError,
    models::{Domain, ModelUnit, OccupancyUnit, PricingUnit, RewardsUnit},
};

/// Static name-to-unit table consulted when a run resolves its model list.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    units: IndexMap<String, Arc<dyn ModelUnit>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in occupancy, rewards and pricing units.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OccupancyUnit));
        registry.register(Arc::new(RewardsUnit));
        registry.register(Arc::new(PricingUnit));
        registry
    }

    /// Registers or replaces the unit under its own name.
    pub fn register(&mut self, unit: Arc<dyn ModelUnit>) {
        self.units.insert(unit.name().to_owned(), unit);
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Looks up a single unit.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ModelUnit>, RunError> {
        self.units
            .get(name)
            .cloned()
            .ok_or_else(|| RunError::UnresolvedModel { name: name.into() })
    }

    /// Resolves every name up front, failing on the first unknown one.
    pub fn resolve_all(
        &self,
        names: &[String],
    ) -> Result<Vec<(String, Arc<dyn ModelUnit>)>, RunError> {
        names
            .iter()
            .map(|name| Ok((name.clone(), self.resolve(name)?)))
            .collect()
    }

    /// Header for a fresh master: feature columns then targets of every unit in the domain.
    #[must_use]
    pub fn default_schema(&self, domain: Domain) -> Schema {
        let units: Vec<_> = self
            .units
            .values()
            .filter(|unit| unit.domain() == domain)
            .collect();
        let mut schema = Schema::default();
        for unit in &units {
            schema = schema.union(unit.feature_columns().columns());
        }
        for unit in &units {
            schema.push(unit.target_column());
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_in_order() {
        let registry = ModelRegistry::with_defaults();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["occupancy", "rewards", "pricing"]
        );
        let resolved = registry
            .resolve_all(&["pricing".into(), "occupancy".into()])
            .unwrap();
        assert_eq!(resolved[0].1.name(), "pricing");
        assert_eq!(resolved[1].1.domain(), Domain::Occupancy);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let registry = ModelRegistry::with_defaults();
        let Err(err) = registry.resolve_all(&["occupancy".into(), "churn".into()]) else {
            panic!("churn should not resolve");
        };
        assert!(matches!(err, RunError::UnresolvedModel { ref name } if name == "churn"));
    }

    #[test]
    fn default_schemas_end_with_targets() {
        let registry = ModelRegistry::with_defaults();
        let occupancy = registry.default_schema(Domain::Occupancy);
        assert_eq!(occupancy.columns().last().map(String::as_str), Some("occ_class"));
        assert!(occupancy.contains("day_of_week"));

        let pricing = registry.default_schema(Domain::Pricing);
        let tail: Vec<_> = pricing.columns().iter().rev().take(2).collect();
        assert_eq!(tail, ["final_price", "points_class"]);
        assert!(pricing.contains("loyalty_points"));
        assert!(!pricing.contains("occ_class"));
    }
}
