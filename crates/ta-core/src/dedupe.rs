//! Grouping of duplicate trails.
//!
//! Imports from several sources leave behind near-identical trails, some
//! marked with a `*`. Titles are compared with the star removed,
//! whitespace trimmed and case folded.

use std::collections::BTreeMap;

/// Title with every `*` removed and surrounding whitespace trimmed.
pub fn clean_title(title: &str) -> String {
    title.replace('*', "").trim().to_string()
}

pub fn dedupe_key(title: &str) -> String {
    clean_title(title).to_lowercase()
}

/// What to do with one group of same-named trails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupeGroup {
    pub canonical: i64,
    /// Set when the canonical title still carries a `*`.
    pub retitle: Option<String>,
    pub duplicates: Vec<i64>,
}

/// Plans the merge for `(id, title)` pairs, given in id order. The first
/// un-starred trail of a group is kept; if every member is starred the first
/// one is. Singletons only show up when their title needs cleaning.
pub fn plan(trails: &[(i64, String)]) -> Vec<DedupeGroup> {
    let mut groups: BTreeMap<String, Vec<&(i64, String)>> = BTreeMap::new();
    for trail in trails {
        groups.entry(dedupe_key(&trail.1)).or_default().push(trail);
    }

    groups
        .into_values()
        .filter_map(|members| {
            let canonical = members
                .iter()
                .find(|(_, title)| !title.contains('*'))
                .or_else(|| members.first())?;
            let clean = clean_title(&canonical.1);
            let retitle = (clean != canonical.1).then_some(clean);
            let duplicates: Vec<i64> = members
                .iter()
                .map(|(id, _)| *id)
                .filter(|id| *id != canonical.0)
                .collect();

            (retitle.is_some() || !duplicates.is_empty()).then_some(DedupeGroup {
                canonical: canonical.0,
                retitle,
                duplicates,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trails(list: &[(i64, &str)]) -> Vec<(i64, String)> {
        list.iter().map(|(id, t)| (*id, t.to_string())).collect()
    }

    #[test]
    fn keys_ignore_stars_case_and_padding() {
        assert_eq!(dedupe_key(" Hunter Creek* "), "hunter creek");
        assert_eq!(dedupe_key("HUNTER CREEK"), "hunter creek");
    }

    #[test]
    fn prefers_unstarred_canonical() {
        let plan = plan(&trails(&[(1, "Rim Trail*"), (2, "rim trail"), (3, "Rim Trail")]));
        assert_eq!(
            plan,
            vec![DedupeGroup { canonical: 2, retitle: None, duplicates: vec![1, 3] }]
        );
    }

    #[test]
    fn all_starred_keeps_first_and_cleans_title() {
        let plan = plan(&trails(&[(4, "*Smuggler"), (9, "Smuggler*")]));
        assert_eq!(plan[0].canonical, 4);
        assert_eq!(plan[0].retitle.as_deref(), Some("Smuggler"));
        assert_eq!(plan[0].duplicates, vec![9]);
    }

    #[test]
    fn clean_singletons_are_left_alone() {
        let plan = plan(&trails(&[(1, "Arbaney Kittle"), (2, "Red Hill*")]));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].canonical, 2);
        assert!(plan[0].duplicates.is_empty());
    }
}
