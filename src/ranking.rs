//! Choosing one record out of a candidate set.
//!
//! First valid wins, ties broken by payload order. Platform matching is
//! advisory: it can produce a recommendation, never a different choice.

use crate::platform::Platform;
use crate::record::DeviceRecord;

/// Outcome of ranking a candidate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    /// Index of the chosen candidate.
    pub chosen: usize,

    /// False when no candidate passed validation and the first one was taken.
    pub validated: bool,

    /// A different valid candidate that looks like this machine's platform.
    pub recommended: Option<usize>,
}

/// Ranks `candidates`; `None` only for an empty set.
pub fn rank(candidates: &[DeviceRecord], platform: Platform) -> Option<Ranking> {
    if candidates.is_empty() {
        return None;
    }

    let (chosen, validated) = match candidates.iter().position(DeviceRecord::is_valid) {
        Some(index) => (index, true),
        None => (0, false),
    };

    Some(Ranking {
        chosen,
        validated,
        recommended: recommend(candidates, platform).filter(|index| *index != chosen),
    })
}

/// First valid candidate whose OS hint or name matches `platform`.
pub fn recommend(candidates: &[DeviceRecord], platform: Platform) -> Option<usize> {
    candidates.iter().position(|record| {
        record.is_valid()
            && (record
                .os_hint
                .as_deref()
                .is_some_and(|os| platform.matches_hint(os))
                || platform.matches_hint(&record.display_name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(name: &str, os: &str) -> DeviceRecord {
        DeviceRecord::new("12345678-1234-1234-1234-123456789abc", "87654321", name).with_os_hint(os)
    }

    fn invalid(name: &str) -> DeviceRecord {
        DeviceRecord::new("?", "x", name)
    }

    #[test]
    fn test_empty_set() {
        assert_eq!(rank(&[], Platform::Linux), None);
    }

    #[test]
    fn test_first_valid_wins() {
        let candidates = vec![invalid("Old"), valid("Phone", "android"), valid("Tablet", "android")];
        let ranking = rank(&candidates, Platform::Linux).unwrap();
        assert_eq!(ranking.chosen, 1);
        assert!(ranking.validated);
        assert_eq!(ranking.recommended, None);
    }

    #[test]
    fn test_no_valid_candidate_takes_first_unvalidated() {
        let candidates = vec![invalid("A"), invalid("B")];
        let ranking = rank(&candidates, Platform::MacOS).unwrap();
        assert_eq!(ranking.chosen, 0);
        assert!(!ranking.validated);
    }

    #[test]
    fn test_platform_match_is_only_advisory() {
        let candidates = vec![valid("Phone", "android"), valid("Desktop", "Windows 10")];
        let ranking = rank(&candidates, Platform::Windows).unwrap();
        assert_eq!(ranking.chosen, 0);
        assert_eq!(ranking.recommended, Some(1));
    }

    #[test]
    fn test_recommendation_matching_choice_is_dropped() {
        let candidates = vec![valid("MacBook", ""), valid("Phone", "ios")];
        let ranking = rank(&candidates, Platform::MacOS).unwrap();
        assert_eq!(ranking.chosen, 0);
        assert_eq!(ranking.recommended, None);
    }
}
