use std::collections::BTreeSet;

use crate::diff::{Difference, DifferenceKind};
use crate::model::ObjectType;

/// Inclusion policy applied to a difference list before planning. Kept
/// separate from the differ so callers can still report what was excluded.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    /// Object types never synchronized.
    pub excluded_types: BTreeSet<ObjectType>,
    /// Case-insensitive prefixes of qualified names to skip.
    pub deny_prefixes: Vec<String>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        FilterPolicy {
            excluded_types: [
                ObjectType::User,
                ObjectType::Role,
                ObjectType::Queue,
                ObjectType::Service,
            ]
            .into_iter()
            .collect(),
            // Framework-managed legacy objects that are never deployed.
            deny_prefixes: vec!["dbo.aspnet_sql".to_string(), "dbo.sqlquery".to_string()],
        }
    }
}

impl FilterPolicy {
    /// Default type exclusions with a caller-supplied deny list.
    pub fn with_deny_prefixes(deny_prefixes: Vec<String>) -> Self {
        FilterPolicy {
            deny_prefixes,
            ..Default::default()
        }
    }

    fn denied_by_name(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.deny_prefixes
            .iter()
            .any(|prefix| lowered.starts_with(&prefix.to_lowercase()))
    }

    pub fn includes(&self, difference: &Difference) -> bool {
        difference.kind != DifferenceKind::Equal
            && !self.excluded_types.contains(&difference.object_type)
            && !self.denied_by_name(&difference.name)
    }
}

/// Sets the `included` flag on every difference according to `policy`.
/// Pure transform: the input list is consumed and returned in the same
/// order with only the flags rewritten.
pub fn apply_policy(differences: Vec<Difference>, policy: &FilterPolicy) -> Vec<Difference> {
    differences
        .into_iter()
        .map(|mut difference| {
            difference.included = policy.includes(&difference);
            difference
        })
        .collect()
}
