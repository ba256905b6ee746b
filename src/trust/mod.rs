//! Trust signals derived from finalized turns.
//!
//! - `fairness`   - rolling chi-square test of outcome distribution
//! - `reputation` - tier from roll and violation counts

pub mod fairness;
pub mod reputation;

pub use fairness::{FairnessMonitor, FairnessRules, FairnessSnapshot, FairnessStatus};
pub use reputation::{tier, ReputationRules, ReputationTier};
