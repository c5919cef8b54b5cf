//! Model units: the contract the orchestrator drives, plus the built-in
//! occupancy, rewards and pricing implementations.

/// Unit contract, artifacts, predictions, domains and roles.
pub mod unit;
/// Standardization, splits, estimators and scoring helpers.
pub mod classical;
/// Feature rows built from incoming bookings.
pub mod features;
/// Occupancy class model.
pub mod occupancy;
/// Loyalty points class model.
pub mod rewards;
/// Final price model.
pub mod pricing;

pub use occupancy::OccupancyUnit;
pub use pricing::PricingUnit;
pub use rewards::RewardsUnit;
pub use unit::{Domain, ModelArtifact, ModelUnit, Prediction, Role, TrainingMetrics};
