//! Tracker version and milestone vocabulary.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::{Error, Result};

/// Version used when a card's Firefox version isn't a tracker value.
pub const CATCH_ALL_VERSION: &str = "Trunk";

/// Milestone used when a card's Firefox version isn't a tracker value.
pub const CATCH_ALL_MILESTONE: &str = "Future";

/// Valid version and milestone values of one tracker product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerVocabulary {
    pub product: String,
    pub component: String,
    pub versions: BTreeSet<String>,
    pub milestones: BTreeSet<String>,
}

/// Version fields an issue should carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionTarget {
    pub version: String,
    pub target_milestone: String,
}

impl TrackerVocabulary {
    /// Build a vocabulary, failing when a catch-all value is missing.
    pub fn new(
        product: &str,
        component: &str,
        versions: impl IntoIterator<Item = String>,
        milestones: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let versions: BTreeSet<String> = versions.into_iter().collect();
        let milestones: BTreeSet<String> = milestones.into_iter().collect();
        if !versions.contains(CATCH_ALL_VERSION) {
            return Err(Error::Vocabulary(CATCH_ALL_VERSION.to_string()));
        }
        if !milestones.contains(CATCH_ALL_MILESTONE) {
            return Err(Error::Vocabulary(CATCH_ALL_MILESTONE.to_string()));
        }
        Ok(Self {
            product: product.to_string(),
            component: component.to_string(),
            versions,
            milestones,
        })
    }

    /// Map a Firefox version token to tracker values.
    ///
    /// `"91"` becomes `Firefox 91` for whichever of version and milestone
    /// knows that value; anything else falls back to the catch-alls.
    pub fn target_for(&self, firefox_version: Option<&str>) -> VersionTarget {
        let candidate = firefox_version.map(|v| format!("Firefox {}", v));
        let pick = |known: &BTreeSet<String>, fallback: &str| match &candidate {
            Some(c) if known.contains(c) => c.clone(),
            _ => fallback.to_string(),
        };
        VersionTarget {
            version: pick(&self.versions, CATCH_ALL_VERSION),
            target_milestone: pick(&self.milestones, CATCH_ALL_MILESTONE),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_vocabulary() -> TrackerVocabulary {
    let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    TrackerVocabulary::new(
        "Enterprise Information Security",
        "Rapid Risk Analysis",
        strings(&["Trunk", "Firefox 91", "Firefox 92"]),
        strings(&["Future", "Firefox 91"]),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_for_known_version() {
        let vocab = test_vocabulary();
        let target = vocab.target_for(Some("91"));
        assert_eq!(target.version, "Firefox 91");
        assert_eq!(target.target_milestone, "Firefox 91");
    }

    #[test]
    fn test_target_for_partially_known_version() {
        let target = test_vocabulary().target_for(Some("92"));
        assert_eq!(target.version, "Firefox 92");
        assert_eq!(target.target_milestone, "Future");
    }

    #[test]
    fn test_target_for_unversioned() {
        let target = test_vocabulary().target_for(None);
        assert_eq!(target.version, "Trunk");
        assert_eq!(target.target_milestone, "Future");
    }

    #[test]
    fn test_missing_catch_all_is_an_error() {
        let result = TrackerVocabulary::new(
            "P",
            "C",
            vec!["Firefox 91".to_string()],
            vec!["Future".to_string()],
        );
        assert!(matches!(result, Err(Error::Vocabulary(v)) if v == "Trunk"));
    }
}
