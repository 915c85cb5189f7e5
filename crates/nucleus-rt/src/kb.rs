//! The knowledge base: indexing synthesized components, similarity
//! queries, and composition discovery (§4.6).

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Regex,
    Extractor,
    Transformer,
}

/// A synthesized, reusable component (§3 "Synthesized component").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub kind: ComponentKind,
    pub name: String,
    pub description: String,
    pub pattern_or_code: String,
    pub positive_examples: Vec<String>,
    pub negative_examples: Vec<String>,
    pub usage_count: u64,
    pub success_count: u64,
    pub last_used: DateTime<Utc>,
    pub composable_with: Vec<String>,
    pub derived_from: Option<(String, String)>,
}

impl Component {
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.usage_count.max(1) as f64
        }
    }
}

/// `hasDigit`/`hasAlpha`/`hasCurrency`/`hasDateLike` plus a length bucket
/// — the structural signature used to shortlist candidate components
/// before computing similarity (§4.5.2 "Caching").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralSignature {
    pub has_digit: bool,
    pub has_alpha: bool,
    pub has_currency: bool,
    pub has_date_like: bool,
    pub length_bucket: u8,
}

impl StructuralSignature {
    pub fn of(samples: &[String]) -> Self {
        let joined = samples.join(" ");
        let has_digit = joined.chars().any(|c| c.is_ascii_digit());
        let has_alpha = joined.chars().any(|c| c.is_alphabetic());
        let has_currency = joined.chars().any(|c| "$€£¥".contains(c));
        let has_date_like = Regex::new(r"\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}")
            .unwrap()
            .is_match(&joined);
        let avg_len = if samples.is_empty() {
            0
        } else {
            joined.chars().count() / samples.len().max(1)
        };
        let length_bucket = match avg_len {
            0..=8 => 0,
            9..=24 => 1,
            25..=64 => 2,
            _ => 3,
        };
        Self {
            has_digit,
            has_alpha,
            has_currency,
            has_date_like,
            length_bucket,
        }
    }
}

#[derive(Debug, Default)]
pub struct KnowledgeBase {
    components: HashMap<String, Component>,
    next_id: u64,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Component ids are externally-facing identifiers, not the
    /// session-scoped monotonic counters §5 mandates for handles and logic
    /// variables, so a random id (teacher's `lumen-runtime::trace::store`
    /// pattern for run ids) is the natural fit here.
    fn mint_id(&mut self) -> String {
        self.next_id += 1;
        format!("kc-{}", uuid::Uuid::new_v4())
    }

    /// Inserts a freshly synthesized component, assigning it an id. The
    /// caller supplies everything but bookkeeping fields (`id`,
    /// `usage_count`, `success_count`, `last_used`, `composable_with`).
    pub fn insert(
        &mut self,
        kind: ComponentKind,
        name: impl Into<String>,
        description: impl Into<String>,
        pattern_or_code: impl Into<String>,
        positive_examples: Vec<String>,
        negative_examples: Vec<String>,
        now: DateTime<Utc>,
    ) -> String {
        let id = self.mint_id();
        self.components.insert(
            id.clone(),
            Component {
                id: id.clone(),
                kind,
                name: name.into(),
                description: description.into(),
                pattern_or_code: pattern_or_code.into(),
                positive_examples,
                negative_examples,
                usage_count: 0,
                success_count: 0,
                last_used: now,
                composable_with: Vec::new(),
                derived_from: None,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn by_kind(&self, kind: ComponentKind) -> Vec<&Component> {
        self.components.values().filter(|c| c.kind == kind).collect()
    }

    pub fn by_signature(&self, signature: &StructuralSignature) -> Vec<&Component> {
        self.components
            .values()
            .filter(|c| &StructuralSignature::of(&c.positive_examples) == signature)
            .collect()
    }

    /// Jaccard similarity over character multisets of the joined example
    /// strings, matching §4.6's definition exactly (no tokenization — raw
    /// character sets).
    pub fn similarity(examples: &[String], component: &Component) -> f64 {
        let a: HashSet<char> = examples.join(" ").chars().collect();
        let b: HashSet<char> = component.positive_examples.join(" ").chars().collect();
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let intersection = a.intersection(&b).count();
        let union = a.union(&b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }

    /// Ranks every component by `similarity * success_rate`, descending.
    pub fn rank_for(&self, examples: &[String]) -> Vec<(&Component, f64)> {
        let mut ranked: Vec<(&Component, f64)> = self
            .components
            .values()
            .map(|c| {
                let score = Self::similarity(examples, c) * c.success_rate().max(0.01);
                (c, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Records a usage outcome, updating the ranking inputs for future
    /// queries.
    pub fn record_usage(&mut self, id: &str, succeeded: bool, now: DateTime<Utc>) {
        if let Some(c) = self.components.get_mut(id) {
            c.usage_count += 1;
            if succeeded {
                c.success_count += 1;
            }
            c.last_used = now;
        }
    }

    /// Finds every pair of stored components whose patterns, matched
    /// together, cover every example in `targets` (only pairs are
    /// searched, per §4.6 "Composition discovery" — deeper composition is
    /// reserved for explicit `derive` calls).
    pub fn find_composable_pairs(&self, targets: &[String]) -> Vec<(String, String)> {
        let ids: Vec<&String> = self.components.keys().collect();
        let mut pairs = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let a = &self.components[ids[i]];
                let b = &self.components[ids[j]];
                if targets.iter().all(|t| component_covers(a, t) || component_covers(b, t)) {
                    pairs.push((a.id.clone(), b.id.clone()));
                }
            }
        }
        pairs
    }

    /// Creates a new component marking both parents, recording the child
    /// id in each parent's `composable_with` list — the only mutation of
    /// stored components besides usage recording.
    pub fn derive(
        &mut self,
        parent_a: &str,
        parent_b: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        pattern_or_code: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if !self.components.contains_key(parent_a) || !self.components.contains_key(parent_b) {
            return None;
        }
        let positive_examples = [
            self.components[parent_a].positive_examples.clone(),
            self.components[parent_b].positive_examples.clone(),
        ]
        .concat();
        let child_id = self.mint_id();
        self.components.insert(
            child_id.clone(),
            Component {
                id: child_id.clone(),
                kind: ComponentKind::Transformer,
                name: name.into(),
                description: description.into(),
                pattern_or_code: pattern_or_code.into(),
                positive_examples,
                negative_examples: Vec::new(),
                usage_count: 0,
                success_count: 0,
                last_used: now,
                composable_with: Vec::new(),
                derived_from: Some((parent_a.to_string(), parent_b.to_string())),
            },
        );
        if let Some(a) = self.components.get_mut(parent_a) {
            a.composable_with.push(child_id.clone());
        }
        if let Some(b) = self.components.get_mut(parent_b) {
            b.composable_with.push(child_id.clone());
        }
        Some(child_id)
    }

    /// Lossless serialisation of the full store, including timestamps
    /// (§4.6 "Export/import").
    pub fn export(&self) -> serde_json::Value {
        serde_json::json!({
            "next_id": self.next_id,
            "components": self.components.values().collect::<Vec<_>>(),
        })
    }

    pub fn import(data: serde_json::Value) -> Result<Self, serde_json::Error> {
        let next_id: u64 = serde_json::from_value(data["next_id"].clone())?;
        let components: Vec<Component> = serde_json::from_value(data["components"].clone())?;
        Ok(Self {
            components: components.into_iter().map(|c| (c.id.clone(), c)).collect(),
            next_id,
        })
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

fn component_covers(component: &Component, target: &str) -> bool {
    match component.kind {
        ComponentKind::Regex => Regex::new(&component.pattern_or_code)
            .map(|re| re.is_match(target))
            .unwrap_or(false),
        _ => component.positive_examples.iter().any(|e| e == target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn similarity_is_jaccard_over_character_sets() {
        let mut kb = KnowledgeBase::new();
        let id = kb.insert(
            ComponentKind::Regex,
            "price",
            "extracts a dollar amount",
            r"\$\d+",
            vec!["$100".to_string()],
            vec![],
            now(),
        );
        let component = kb.get(&id).unwrap();
        let score = KnowledgeBase::similarity(&["$100".to_string()], component);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn ranking_prefers_higher_success_rate_at_equal_similarity() {
        let mut kb = KnowledgeBase::new();
        let a = kb.insert(
            ComponentKind::Regex,
            "a",
            "d",
            "x",
            vec!["abc".to_string()],
            vec![],
            now(),
        );
        let b = kb.insert(
            ComponentKind::Regex,
            "b",
            "d",
            "x",
            vec!["abc".to_string()],
            vec![],
            now(),
        );
        kb.record_usage(&a, true, now());
        kb.record_usage(&b, false, now());
        let ranked = kb.rank_for(&["abc".to_string()]);
        assert_eq!(ranked[0].0.id, a);
    }

    #[test]
    fn usage_recording_updates_counts() {
        let mut kb = KnowledgeBase::new();
        let id = kb.insert(ComponentKind::Extractor, "n", "d", "x", vec![], vec![], now());
        kb.record_usage(&id, true, now());
        kb.record_usage(&id, false, now());
        let c = kb.get(&id).unwrap();
        assert_eq!(c.usage_count, 2);
        assert_eq!(c.success_count, 1);
    }

    #[test]
    fn derive_links_both_parents_to_the_child() {
        let mut kb = KnowledgeBase::new();
        let a = kb.insert(ComponentKind::Regex, "a", "d", "x", vec![], vec![], now());
        let b = kb.insert(ComponentKind::Regex, "b", "d", "y", vec![], vec![], now());
        let child = kb.derive(&a, &b, "ab", "combined", "xy", now()).unwrap();
        assert!(kb.get(&a).unwrap().composable_with.contains(&child));
        assert!(kb.get(&b).unwrap().composable_with.contains(&child));
        assert_eq!(
            kb.get(&child).unwrap().derived_from,
            Some((a, b))
        );
    }

    #[test]
    fn export_then_import_round_trips_losslessly() {
        let mut kb = KnowledgeBase::new();
        kb.insert(
            ComponentKind::Regex,
            "price",
            "d",
            r"\$\d+",
            vec!["$1".to_string()],
            vec![],
            now(),
        );
        let exported = kb.export();
        let reimported = KnowledgeBase::import(exported).unwrap();
        assert_eq!(reimported.len(), kb.len());
    }

    #[test]
    fn composable_pairs_cover_every_target_example() {
        let mut kb = KnowledgeBase::new();
        let a = kb.insert(
            ComponentKind::Regex,
            "digits",
            "d",
            r"^\d+$",
            vec![],
            vec![],
            now(),
        );
        let b = kb.insert(
            ComponentKind::Regex,
            "words",
            "d",
            r"^[a-z]+$",
            vec![],
            vec![],
            now(),
        );
        let pairs = kb.find_composable_pairs(&["123".to_string(), "abc".to_string()]);
        assert!(pairs.contains(&(a.clone(), b.clone())) || pairs.contains(&(b, a)));
    }
}
