//! Working sets and the snapshots later rules compare against.

use std::collections::{BTreeMap, HashMap};

use provenant_attest::ResourceDescriptor;

use super::parse::{ArtifactRule, RelationalRule};
use super::pattern::Pattern;
use crate::error::VerificationError;

/// Artifacts not yet consumed by a rule set, keyed by name.
///
/// Ordered by name, so the first offending artifact reported by `DISALLOW`
/// does not depend on input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSet {
    artifacts: BTreeMap<String, ResourceDescriptor>,
}

impl WorkingSet {
    /// Build a working set; a later descriptor replaces an earlier one of
    /// the same name.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        Self {
            artifacts: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.name.clone(), descriptor))
                .collect(),
        }
    }

    /// Artifact names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// The descriptor for `name`.
    pub fn get(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.artifacts.get(name)
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether every artifact has been consumed.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    fn matching(&self, pattern: &Pattern) -> Vec<String> {
        match pattern {
            Pattern::Literal(name) => {
                if self.contains(name) {
                    vec![name.clone()]
                } else {
                    Vec::new()
                }
            }
            Pattern::Glob { .. } => self
                .names()
                .filter(|name| pattern.is_match(name))
                .map(str::to_owned)
                .collect(),
        }
    }

    fn remove_all(&mut self, names: &[String]) {
        for name in names {
            self.artifacts.remove(name);
        }
    }

    /// Apply one rule, consuming the artifacts it accounts for.
    pub fn apply(
        &mut self,
        rule: &ArtifactRule,
        snapshots: &ArtifactSnapshots,
    ) -> Result<(), VerificationError> {
        match rule {
            ArtifactRule::Require(pattern) => {
                let matched = self.matching(pattern);
                if matched.is_empty() && !pattern.is_glob() {
                    return Err(VerificationError::RequirementNotMet {
                        pattern: pattern.to_string(),
                    });
                }
                self.remove_all(&matched);
            }
            ArtifactRule::Allow(pattern) => {
                let matched = self.matching(pattern);
                self.remove_all(&matched);
            }
            ArtifactRule::Disallow(pattern) => {
                if let Some(artifact) = self.names().find(|name| pattern.is_match(name)) {
                    return Err(VerificationError::DisallowedArtifactPresent {
                        pattern: pattern.to_string(),
                        artifact: artifact.to_owned(),
                    });
                }
            }
            ArtifactRule::Match(relation) => self.apply_relation(relation, snapshots, true),
            ArtifactRule::Mismatch(relation) => self.apply_relation(relation, snapshots, false),
        }
        Ok(())
    }

    /// Consume sources whose equality with their snapshot counterpart is
    /// `consume_when_equal`. Sources without a counterpart are left alone.
    fn apply_relation(
        &mut self,
        relation: &RelationalRule,
        snapshots: &ArtifactSnapshots,
        consume_when_equal: bool,
    ) {
        let Some(snapshot) = snapshots.get(&relation.field) else {
            tracing::warn!(
                field = %relation.field,
                "no artifact snapshot recorded under this name; rule has no effect"
            );
            return;
        };

        let consumed: Vec<String> = self
            .matching(&relation.source)
            .into_iter()
            .filter(|source_name| {
                let destination = relation.destination_name(source_name);
                let (Some(source), Some(counterpart)) =
                    (self.get(source_name), snapshot.get(&destination))
                else {
                    tracing::debug!(
                        source = %source_name,
                        %destination,
                        "no counterpart in snapshot"
                    );
                    return false;
                };
                source.same_artifact(counterpart) == consume_when_equal
            })
            .collect();
        self.remove_all(&consumed);
    }
}

/// Pre-consumption working sets recorded by earlier rule sets in a run.
#[derive(Debug, Default)]
pub struct ArtifactSnapshots {
    snapshots: HashMap<String, WorkingSet>,
}

impl ArtifactSnapshots {
    /// The snapshot recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&WorkingSet> {
        self.snapshots.get(key)
    }

    /// Record a snapshot. The first snapshot recorded under a key is kept.
    pub fn record(&mut self, key: String, set: WorkingSet) {
        if self.snapshots.contains_key(&key) {
            tracing::debug!(%key, "artifact snapshot already recorded");
            return;
        }
        tracing::debug!(%key, artifacts = set.len(), "recorded artifact snapshot");
        self.snapshots.insert(key, set);
    }

    /// Number of recorded snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no snapshot has been recorded.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, digest: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            name: name.to_owned(),
            digest: [("sha256".to_owned(), digest.to_owned())].into(),
            ..ResourceDescriptor::default()
        }
    }

    fn set(names: &[&str]) -> WorkingSet {
        WorkingSet::from_descriptors(names.iter().map(|n| descriptor(n, "d")))
    }

    fn rule(source: &str) -> ArtifactRule {
        source.parse().unwrap()
    }

    fn apply(ws: &mut WorkingSet, source: &str) -> Result<(), VerificationError> {
        ws.apply(&rule(source), &ArtifactSnapshots::default())
    }

    fn remaining(ws: &WorkingSet) -> Vec<&str> {
        ws.names().collect()
    }

    #[test]
    fn require_removes_then_fails_on_rerun() {
        let mut ws = set(&["a", "b", "c"]);
        apply(&mut ws, r#"REQUIRE "a""#).unwrap();
        assert_eq!(remaining(&ws), ["b", "c"]);

        let err = apply(&mut ws, r#"REQUIRE "a""#).unwrap_err();
        assert!(matches!(err, VerificationError::RequirementNotMet { pattern } if pattern == "a"));
        assert_eq!(remaining(&ws), ["b", "c"]);
    }

    #[test]
    fn wildcard_require_removes_matches_and_tolerates_none() {
        let mut ws = set(&["lib1", "lib2", "app"]);
        apply(&mut ws, r#"REQUIRE "lib*""#).unwrap();
        assert_eq!(remaining(&ws), ["app"]);
        apply(&mut ws, r#"REQUIRE "doc*""#).unwrap();
        assert_eq!(remaining(&ws), ["app"]);
    }

    #[test]
    fn disallow_fails_without_removing() {
        let mut ws = set(&["x1", "x2", "y"]);
        let err = apply(&mut ws, r#"DISALLOW "x*""#).unwrap_err();
        assert!(matches!(
            err,
            VerificationError::DisallowedArtifactPresent { artifact, .. }
                if artifact == "x1"
        ));
        assert_eq!(remaining(&ws), ["x1", "x2", "y"]);
    }

    #[test]
    fn disallow_only_sees_remaining_artifacts() {
        let mut ws = set(&["out.bin", "scratch.tmp"]);
        apply(&mut ws, r#"ALLOW "*.tmp""#).unwrap();
        apply(&mut ws, r#"DISALLOW "*.tmp""#).unwrap();
        assert_eq!(remaining(&ws), ["out.bin"]);
    }

    #[test]
    fn disallow_glob_matches_inside_name() {
        let mut ws = set(&["out.bin", "scratch.tmp.bak"]);
        let err = apply(&mut ws, r#"DISALLOW "*.tmp""#).unwrap_err();
        assert!(matches!(
            err,
            VerificationError::DisallowedArtifactPresent { artifact, .. }
                if artifact == "scratch.tmp.bak"
        ));
    }

    #[test]
    fn allow_glob_matches_inside_name() {
        let mut ws = set(&["mylib1", "app"]);
        apply(&mut ws, r#"ALLOW "lib*""#).unwrap();
        assert_eq!(remaining(&ws), ["app"]);
    }

    #[test]
    fn glob_and_literal_allow_agree() {
        let mut glob = set(&["lib1", "lib2", "app"]);
        apply(&mut glob, r#"ALLOW "lib*""#).unwrap();
        assert_eq!(remaining(&glob), ["app"]);

        let mut literal = set(&["lib1", "lib2", "app"]);
        apply(&mut literal, r#"ALLOW "lib1""#).unwrap();
        assert_eq!(remaining(&literal), ["app", "lib2"]);

        let mut single = set(&["lib1", "app"]);
        let mut named = single.clone();
        apply(&mut single, r#"ALLOW "lib*""#).unwrap();
        apply(&mut named, r#"ALLOW "lib1""#).unwrap();
        assert_eq!(single, named);
    }

    #[test]
    fn allow_without_match_is_noop() {
        let mut ws = set(&["a"]);
        apply(&mut ws, r#"ALLOW "b""#).unwrap();
        assert_eq!(remaining(&ws), ["a"]);
    }

    #[test]
    fn duplicate_names_collapse_last_wins() {
        let ws = WorkingSet::from_descriptors([descriptor("a", "1"), descriptor("a", "2")]);
        assert_eq!(ws.len(), 1);
        assert_eq!(ws.get("a").unwrap().digest["sha256"], "2");
    }

    fn snapshots_with(key: &str, artifacts: Vec<ResourceDescriptor>) -> ArtifactSnapshots {
        let mut snapshots = ArtifactSnapshots::default();
        snapshots.record(key.to_owned(), WorkingSet::from_descriptors(artifacts));
        snapshots
    }

    #[test]
    fn match_consumes_equal_artifacts() {
        let snapshots = snapshots_with("A.materials", vec![descriptor("foo", "D")]);

        let mut same = WorkingSet::from_descriptors([descriptor("foo", "D")]);
        same.apply(&rule(r#"MATCH "foo" WITH "A.materials""#), &snapshots).unwrap();
        assert!(same.is_empty());

        let mut changed = WorkingSet::from_descriptors([descriptor("foo", "D2")]);
        changed.apply(&rule(r#"MATCH "foo" WITH "A.materials""#), &snapshots).unwrap();
        assert!(changed.contains("foo"));
        changed.apply(&rule(r#"MISMATCH "foo" WITH "A.materials""#), &snapshots).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn mismatch_keeps_equal_artifacts() {
        let snapshots = snapshots_with("A.materials", vec![descriptor("foo", "D")]);
        let mut ws = WorkingSet::from_descriptors([descriptor("foo", "D")]);
        ws.apply(&rule(r#"MISMATCH "foo" WITH "A.materials""#), &snapshots).unwrap();
        assert!(ws.contains("foo"));
    }

    #[test]
    fn annotations_do_not_affect_match() {
        let mut annotated = descriptor("foo", "D");
        annotated.annotations = Some(serde_json::json!({ "note": "x" }));
        let snapshots = snapshots_with("A.materials", vec![annotated]);
        let mut ws = WorkingSet::from_descriptors([descriptor("foo", "D")]);
        ws.apply(&rule(r#"MATCH "foo" WITH "A.materials""#), &snapshots).unwrap();
        assert!(ws.is_empty());
    }

    #[test]
    fn glob_match_strips_source_prefix() {
        let snapshots = snapshots_with(
            "A.products",
            vec![descriptor("a.o", "1"), descriptor("lib/b.o", "2")],
        );
        let mut ws = WorkingSet::from_descriptors([
            descriptor("a.o", "1"),
            descriptor("build/lib/b.o", "2"),
            descriptor("build/c.o", "3"),
        ]);
        ws.apply(&rule(r#"MATCH "*.o" WITH "A.products""#), &snapshots).unwrap();
        assert_eq!(remaining(&ws), ["build/c.o", "build/lib/b.o"]);

        // The counterpart of build/lib/b.o is lib/b.o; the names differ, so
        // only MISMATCH consumes it. build/c.o has no counterpart.
        let prefixed_match = rule(r#"MATCH "*.o" IN "build/" WITH "A.products""#);
        ws.apply(&prefixed_match, &snapshots).unwrap();
        assert_eq!(remaining(&ws), ["build/c.o", "build/lib/b.o"]);
        let prefixed_mismatch = rule(r#"MISMATCH "*.o" IN "build/" WITH "A.products""#);
        ws.apply(&prefixed_mismatch, &snapshots).unwrap();
        assert_eq!(remaining(&ws), ["build/c.o"]);
    }

    #[test]
    fn missing_counterpart_or_snapshot_is_noop() {
        let snapshots = snapshots_with("A.materials", vec![descriptor("bar", "D")]);
        let mut ws = WorkingSet::from_descriptors([descriptor("foo", "D")]);
        ws.apply(&rule(r#"MATCH "foo" WITH "A.materials""#), &snapshots).unwrap();
        ws.apply(&rule(r#"MISMATCH "foo" WITH "A.materials""#), &snapshots).unwrap();
        ws.apply(&rule(r#"MISMATCH "*" WITH "never.recorded""#), &snapshots).unwrap();
        assert_eq!(remaining(&ws), ["foo"]);
    }

    #[test]
    fn first_snapshot_is_kept() {
        let mut snapshots = ArtifactSnapshots::default();
        snapshots.record("a.products".to_owned(), set(&["x"]));
        snapshots.record("a.products".to_owned(), set(&["y"]));
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots.get("a.products").unwrap().contains("x"));
    }

    mod proptests {
        use super::*;
        use proptest::collection::{btree_set, vec};
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn disallow_never_removes(
                names in btree_set("[a-z]{1,6}", 0..12),
                pattern in "[a-z]{0,2}\\*?",
            ) {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                let mut ws = set(&names);
                let before = ws.clone();
                let _ = apply(&mut ws, &format!("DISALLOW \"{pattern}\""));
                prop_assert_eq!(ws, before);
            }

            #[test]
            fn allow_removes_exactly_matches(
                names in btree_set("[a-z]{1,6}", 0..12),
                prefix in "[a-z]{0,2}",
            ) {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                let mut ws = set(&names);
                apply(&mut ws, &format!("ALLOW \"{prefix}*\"")).unwrap();
                let expected: Vec<&str> = names
                    .iter()
                    .copied()
                    .filter(|n| !n.contains(prefix.as_str()))
                    .collect();
                prop_assert_eq!(remaining(&ws), expected);
            }

            #[test]
            fn working_set_never_grows(
                names in btree_set("[a-z]{1,4}", 0..8),
                rules in vec("(REQUIRE|ALLOW|DISALLOW) \"[a-z]{0,2}\\*?\"", 0..6),
            ) {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                let mut ws = set(&names);
                for source in &rules {
                    let before = ws.len();
                    if apply(&mut ws, source).is_err() {
                        break;
                    }
                    prop_assert!(ws.len() <= before);
                }
            }
        }
    }
}
