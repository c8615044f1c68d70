//! Set Classifier
//!
//! Decides which catalog language partition a showcase set name belongs to.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::catalog::{CatalogLanguage, CatalogSet};
use crate::domain::value_objects::normalize_name;

static NON_ENGLISH_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\bjp\b|\bjpn\b|japanese|pokemon\s+japan|\bchinese\b|\bkorean\b|\bthai\b)")
        .expect("valid language marker regex")
});

/// Whether a raw set name textually signals a non-English printing
pub fn has_non_english_marker(set_name: &str) -> bool {
    NON_ENGLISH_MARKER.is_match(set_name)
}

/// Normalized set name → catalog set rows, in insertion order
#[derive(Debug, Default)]
pub struct SetIndex {
    keys: Vec<(String, Vec<usize>)>,
    positions: HashMap<String, usize>,
    sets: Vec<CatalogSet>,
}

impl SetIndex {
    pub fn new(sets: Vec<CatalogSet>) -> Self {
        let mut index = Self::default();
        for set in sets {
            index.insert(set);
        }
        index
    }

    fn insert(&mut self, set: CatalogSet) {
        let row = self.sets.len();
        for name in set.lookup_names() {
            let key = normalize_name(name);
            if key.is_empty() {
                continue;
            }
            match self.positions.get(&key) {
                Some(&position) => {
                    let rows = &mut self.keys[position].1;
                    if !rows.contains(&row) {
                        rows.push(row);
                    }
                }
                None => {
                    self.positions.insert(key.clone(), self.keys.len());
                    self.keys.push((key, vec![row]));
                }
            }
        }
        self.sets.push(set);
    }

    fn collect_rows<'a>(&'a self, rows: &[usize], seen: &mut HashSet<i64>, found: &mut Vec<&'a CatalogSet>) {
        for &row in rows {
            let set = &self.sets[row];
            if seen.insert(set.id) {
                found.push(set);
            }
        }
    }

    /// Sets whose lookup names equal `set_name` after normalization. With
    /// `allow_partial`, a miss falls back to every key that contains or is
    /// contained by the normalized name.
    pub fn find(&self, set_name: &str, allow_partial: bool) -> Vec<&CatalogSet> {
        let normalized = normalize_name(set_name);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        if let Some(&position) = self.positions.get(&normalized) {
            self.collect_rows(&self.keys[position].1, &mut seen, &mut found);
        }
        if !allow_partial || !found.is_empty() {
            return found;
        }

        for (key, rows) in &self.keys {
            if key.contains(&normalized) || normalized.contains(key.as_str()) {
                self.collect_rows(rows, &mut seen, &mut found);
            }
        }
        found
    }
}

/// Outcome of classifying one set name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetClassification {
    pub is_japanese: bool,
    /// Whether the chosen partition knows the set
    pub matched: bool,
}

impl SetClassification {
    pub fn language(&self) -> CatalogLanguage {
        if self.is_japanese {
            CatalogLanguage::Japanese
        } else {
            CatalogLanguage::English
        }
    }
}

/// Both catalog set indices, loaded once per run
#[derive(Debug, Default)]
pub struct SetClassifier {
    english: SetIndex,
    japan: SetIndex,
}

impl SetClassifier {
    pub fn new(english_sets: Vec<CatalogSet>, japan_sets: Vec<CatalogSet>) -> Self {
        Self {
            english: SetIndex::new(english_sets),
            japan: SetIndex::new(japan_sets),
        }
    }

    pub fn index(&self, language: CatalogLanguage) -> &SetIndex {
        match language {
            CatalogLanguage::English => &self.english,
            CatalogLanguage::Japanese => &self.japan,
        }
    }

    /// English requires an exact name; Japan accepts partial names
    pub fn classify(&self, set_name: Option<&str>) -> SetClassification {
        let Some(set_name) = set_name.filter(|name| !name.trim().is_empty()) else {
            return SetClassification::default();
        };

        let english_match = !self.english.find(set_name, false).is_empty();
        let japan_match = !self.japan.find(set_name, true).is_empty();
        let is_japanese = has_non_english_marker(set_name) || (!english_match && japan_match);

        SetClassification {
            is_japanese,
            matched: if is_japanese { japan_match } else { english_match },
        }
    }
}
