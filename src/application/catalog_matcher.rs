//! Catalog Matcher
//!
//! Resolves aggregated entries to catalog products. Id-bearing entries are
//! looked up directly; id-less English entries go through a set/number
//! index; Japanese entries without a direct hit get one targeted probe each
//! and always carry a [`JapaneseChecks`] record.

use std::collections::{HashMap, HashSet};

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use crate::application::aggregator::Aggregation;
use crate::application::set_classifier::SetClassifier;
use crate::domain::catalog::{CatalogLanguage, ProductWithSet};
use crate::domain::constants::matching::{ID_BATCH_SIZE, JAPAN_CANDIDATE_LIMIT, SET_BATCH_SIZE};
use crate::domain::reconciliation::{AggregatedEntry, JapaneseChecks, MatchResult};
use crate::domain::repositories::{CatalogRepository, JapanProductProbe};
use crate::domain::value_objects::{names_loosely_match, normalize_card_number, strip_jp_tag};
use crate::error::{ImportError, ImportResult};

/// Compare a Japanese entry with the product it was matched to, if any
pub fn japanese_checks(entry: &AggregatedEntry, product: Option<&ProductWithSet>) -> JapaneseChecks {
    let set = product.and_then(|p| p.set.as_ref());
    let set_match = entry.set_name.as_deref().is_some_and(|showcase_set| {
        set.is_some_and(|set| {
            names_loosely_match(showcase_set, &set.name)
                || set.name_other.as_deref().is_some_and(|other| names_loosely_match(showcase_set, other))
        })
    });

    let showcase_number = entry.card_number.as_deref().and_then(normalize_card_number);
    let product_number = product
        .and_then(|p| p.product.card_number.as_deref())
        .and_then(normalize_card_number);
    let card_number_match = showcase_number.is_some() && showcase_number == product_number;

    let name_match = match (entry.showcase_name.as_deref(), product) {
        (Some(name), Some(product)) => Some(names_loosely_match(name, &product.product.name)),
        _ => None,
    };

    JapaneseChecks {
        set_match,
        card_number_match,
        name_match,
    }
}

/// Checks for an entry that cannot be probed: only what the showcase knows
fn presence_checks(entry: &AggregatedEntry) -> JapaneseChecks {
    JapaneseChecks {
        set_match: entry.set_name.is_some(),
        card_number_match: entry.card_number.is_some(),
        name_match: entry.showcase_name.as_ref().map(|_| false),
    }
}

fn probe_for(entry: &AggregatedEntry) -> Option<JapanProductProbe> {
    let set_name = entry.set_name.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let card_number = entry.card_number.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
    Some(JapanProductProbe {
        normalized_card_number: normalize_card_number(card_number)?,
        name: entry
            .showcase_name
            .as_deref()
            .map(strip_jp_tag)
            .filter(|name| !name.is_empty()),
        set_name: Some(set_name.to_string()),
        limit: JAPAN_CANDIDATE_LIMIT,
    })
}

fn unique<T: Copy + Eq + std::hash::Hash>(values: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|value| seen.insert(*value)).collect()
}

pub struct CatalogMatcher<'a> {
    repository: &'a dyn CatalogRepository,
    classifier: &'a SetClassifier,
    concurrency: usize,
}

impl<'a> CatalogMatcher<'a> {
    pub fn new(repository: &'a dyn CatalogRepository, classifier: &'a SetClassifier, concurrency: usize) -> Self {
        Self {
            repository,
            classifier,
            concurrency: concurrency.max(1),
        }
    }

    /// One result per entry: id-bearing entries first, each group in
    /// aggregation order
    pub async fn match_entries(&self, aggregation: &Aggregation) -> ImportResult<Vec<MatchResult>> {
        let (japanese_ids, english_ids): (Vec<&AggregatedEntry>, Vec<&AggregatedEntry>) =
            aggregation.id_bearing.iter().partition(|entry| entry.is_japanese);
        let english_direct = self
            .products_by_external_ids(CatalogLanguage::English, &english_ids)
            .await?;
        let japan_direct = self
            .products_by_external_ids(CatalogLanguage::Japanese, &japanese_ids)
            .await?;

        let (japanese_missing, english_missing): (Vec<&AggregatedEntry>, Vec<&AggregatedEntry>) =
            aggregation.id_less.iter().partition(|entry| entry.is_japanese);
        let english_fuzzy = self.match_english(&english_missing).await?;

        let fallback: Vec<&AggregatedEntry> = japanese_ids
            .iter()
            .copied()
            .filter(|entry| entry.external_id().is_none_or(|id| !japan_direct.contains_key(&id)))
            .collect();
        let japan_fallback = self.probe_japanese(&fallback).await?;
        let japan_missing = self.probe_japanese(&japanese_missing).await?;

        let mut results = Vec::with_capacity(aggregation.entry_count());
        let mut fallback_results = japan_fallback.into_iter();
        for entry in &aggregation.id_bearing {
            let Some(id) = entry.external_id() else { continue };
            if !entry.is_japanese {
                results.push(MatchResult::for_id_bearing(entry, english_direct.get(&id), None));
                continue;
            }
            match japan_direct.get(&id) {
                Some(product) => {
                    let checks = japanese_checks(entry, Some(product));
                    results.push(MatchResult::for_id_bearing(entry, Some(product), Some(checks)));
                }
                None => {
                    let (product, checks) = fallback_results
                        .next()
                        .unwrap_or_else(|| (None, japanese_checks(entry, None)));
                    results.push(MatchResult::for_id_bearing(entry, product.as_ref(), Some(checks)));
                }
            }
        }

        let mut english_results = english_fuzzy.into_iter();
        let mut japan_results = japan_missing.into_iter();
        for entry in &aggregation.id_less {
            if entry.is_japanese {
                let (product, checks) = japan_results.next().unwrap_or_else(|| (None, presence_checks(entry)));
                results.push(MatchResult::for_id_less(entry, product.as_ref(), Some(checks)));
            } else {
                let product = english_results.next().flatten();
                results.push(MatchResult::for_id_less(entry, product.as_ref(), None));
            }
        }

        info!(
            "Matched {} of {} entries against the catalog",
            results.iter().filter(|result| result.matched).count(),
            results.len()
        );
        Ok(results)
    }

    async fn products_by_external_ids(
        &self,
        language: CatalogLanguage,
        entries: &[&AggregatedEntry],
    ) -> ImportResult<HashMap<i64, ProductWithSet>> {
        let ids = unique(entries.iter().filter_map(|entry| entry.external_id()));
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let repository = self.repository;
        let chunks: Vec<Vec<ProductWithSet>> = stream::iter(ids.chunks(ID_BATCH_SIZE))
            .map(|chunk| repository.products_by_external_ids(language, chunk))
            .buffered(self.concurrency)
            .try_collect()
            .await
            .map_err(ImportError::catalog)?;

        let products: HashMap<i64, ProductWithSet> = chunks
            .into_iter()
            .flatten()
            .map(|row| (row.product.external_id, row))
            .collect();
        debug!("Direct {:?} lookup: {} of {} ids found", language, products.len(), ids.len());
        Ok(products)
    }

    async fn products_by_set_ids(
        &self,
        language: CatalogLanguage,
        set_ids: &[i64],
    ) -> ImportResult<Vec<ProductWithSet>> {
        let repository = self.repository;
        let chunks: Vec<Vec<ProductWithSet>> = stream::iter(set_ids.chunks(SET_BATCH_SIZE))
            .map(|chunk| repository.products_by_set_ids(language, chunk))
            .buffered(self.concurrency)
            .try_collect()
            .await
            .map_err(ImportError::catalog)?;
        Ok(chunks.into_iter().flatten().collect())
    }

    /// Blind set/number lookup for id-less English entries
    async fn match_english(&self, entries: &[&AggregatedEntry]) -> ImportResult<Vec<Option<ProductWithSet>>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.classifier.index(CatalogLanguage::English);
        let candidate_sets: Vec<Vec<i64>> = entries
            .iter()
            .map(|entry| {
                entry
                    .set_name
                    .as_deref()
                    .map(|set_name| index.find(set_name, true).iter().map(|set| set.id).collect())
                    .unwrap_or_default()
            })
            .collect();
        let set_ids = unique(candidate_sets.iter().flatten().copied());
        if set_ids.is_empty() {
            return Ok(vec![None; entries.len()]);
        }

        let mut by_set_and_number: HashMap<(i64, String), Vec<ProductWithSet>> = HashMap::new();
        for row in self.products_by_set_ids(CatalogLanguage::English, &set_ids).await? {
            let Some(set_id) = row.product.set_id else { continue };
            let Some(number) = row.product.card_number.as_deref().and_then(normalize_card_number) else {
                continue;
            };
            by_set_and_number.entry((set_id, number)).or_default().push(row);
        }
        debug!(
            "English fuzzy index: {} sets, {} set/number keys",
            set_ids.len(),
            by_set_and_number.len()
        );

        Ok(entries
            .iter()
            .zip(&candidate_sets)
            .map(|(entry, sets)| {
                let number = entry.card_number.as_deref().and_then(normalize_card_number)?;
                sets.iter().find_map(|set_id| {
                    let candidates = by_set_and_number.get(&(*set_id, number.clone()))?;
                    entry
                        .showcase_name
                        .as_deref()
                        .and_then(|name| {
                            candidates
                                .iter()
                                .find(|row| names_loosely_match(&row.product.name, name))
                        })
                        .or_else(|| candidates.first())
                        .cloned()
                })
            })
            .collect())
    }

    /// One catalog probe per Japanese entry, in entry order
    async fn probe_japanese(
        &self,
        entries: &[&AggregatedEntry],
    ) -> ImportResult<Vec<(Option<ProductWithSet>, JapaneseChecks)>> {
        let repository = self.repository;
        stream::iter(entries.iter().copied())
            .map(|entry| async move {
                let Some(probe) = probe_for(entry) else {
                    let checks = if entry.external_id().is_some() {
                        japanese_checks(entry, None)
                    } else {
                        presence_checks(entry)
                    };
                    return Ok::<_, anyhow::Error>((None, checks));
                };
                let product = repository.search_japan_products(&probe).await?.into_iter().next();
                let checks = japanese_checks(entry, product.as_ref());
                Ok((product, checks))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
            .map_err(ImportError::catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{CatalogProduct, CatalogSet};
    use crate::domain::reconciliation::EntryIdentity;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn set(id: i64, name: &str, language: CatalogLanguage) -> CatalogSet {
        CatalogSet {
            id,
            name: name.into(),
            name_other: None,
            code: Some(format!("S{id}")),
            language,
        }
    }

    fn product(external_id: i64, name: &str, set: &CatalogSet, number: &str) -> ProductWithSet {
        ProductWithSet {
            product: CatalogProduct {
                id: external_id * 10,
                external_id,
                name: name.into(),
                set_id: Some(set.id),
                card_number: Some(number.into()),
                rarity: Some("Rare".into()),
                image_url: None,
                market_price: Some(1.5),
                product_type: Some("Cards".into()),
            },
            set: Some(set.clone()),
        }
    }

    #[derive(Default)]
    struct FakeCatalog {
        english: Vec<ProductWithSet>,
        japan: Vec<ProductWithSet>,
        probes: Mutex<Vec<JapanProductProbe>>,
        fail: bool,
    }

    impl FakeCatalog {
        fn rows(&self, language: CatalogLanguage) -> &[ProductWithSet] {
            match language {
                CatalogLanguage::English => &self.english,
                CatalogLanguage::Japanese => &self.japan,
            }
        }
    }

    #[async_trait]
    impl CatalogRepository for FakeCatalog {
        async fn list_sets(&self, _language: CatalogLanguage) -> Result<Vec<CatalogSet>> {
            Ok(Vec::new())
        }

        async fn products_by_external_ids(
            &self,
            language: CatalogLanguage,
            external_ids: &[i64],
        ) -> Result<Vec<ProductWithSet>> {
            if self.fail {
                anyhow::bail!("catalog offline");
            }
            Ok(self
                .rows(language)
                .iter()
                .filter(|row| external_ids.contains(&row.product.external_id))
                .cloned()
                .collect())
        }

        async fn products_by_set_ids(&self, language: CatalogLanguage, set_ids: &[i64]) -> Result<Vec<ProductWithSet>> {
            Ok(self
                .rows(language)
                .iter()
                .filter(|row| row.product.set_id.is_some_and(|id| set_ids.contains(&id)))
                .cloned()
                .collect())
        }

        async fn search_japan_products(&self, probe: &JapanProductProbe) -> Result<Vec<ProductWithSet>> {
            self.probes.lock().unwrap().push(probe.clone());
            Ok(self
                .japan
                .iter()
                .filter(|row| {
                    row.product.card_number.as_deref().and_then(normalize_card_number).as_deref()
                        == Some(probe.normalized_card_number.as_str())
                })
                .take(probe.limit as usize)
                .cloned()
                .collect())
        }
    }

    fn entry(identity: EntryIdentity, set: Option<&str>, name: Option<&str>, number: Option<&str>) -> AggregatedEntry {
        AggregatedEntry {
            collection_scope: "default".into(),
            identity,
            collection_id: None,
            collection_name: None,
            quantity: 1,
            set_name: set.map(str::to_string),
            showcase_name: name.map(str::to_string),
            image_url: None,
            card_number: number.map(str::to_string),
            rarity: None,
            is_japanese: false,
        }
    }

    #[tokio::test]
    async fn test_id_less_english_entry_matches_by_set_and_number() {
        let jungle = set(1, "Jungle", CatalogLanguage::English);
        let catalog = FakeCatalog {
            english: vec![
                product(100, "Clefairy", &jungle, "5/64"),
                product(101, "Clefable", &jungle, "05/64"),
            ],
            ..FakeCatalog::default()
        };
        let classifier = SetClassifier::new(vec![jungle], Vec::new());
        let aggregation = Aggregation {
            id_less: vec![entry(
                EntryIdentity::Composite("jungle|clefable|5/64".into()),
                Some("Jungle"),
                Some("Clefable"),
                Some("5/64"),
            )],
            ..Aggregation::default()
        };

        let results = CatalogMatcher::new(&catalog, &classifier, 2)
            .match_entries(&aggregation)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].matched);
        assert_eq!(results[0].tcg_product_id, Some(101));
        assert_eq!(results[0].name.as_deref(), Some("Clefable"));
        assert_eq!(results[0].set.as_deref(), Some("Jungle"));
        assert!(results[0].japanese_checks.is_none());
    }

    #[tokio::test]
    async fn test_direct_hits_precede_fuzzy_results() {
        let jungle = set(1, "Jungle", CatalogLanguage::English);
        let catalog = FakeCatalog {
            english: vec![product(7, "Snorlax", &jungle, "27/64")],
            ..FakeCatalog::default()
        };
        let classifier = SetClassifier::new(vec![jungle], Vec::new());
        let aggregation = Aggregation {
            id_bearing: vec![
                entry(EntryIdentity::External(7), None, None, None),
                entry(EntryIdentity::External(8), None, Some("Unknown"), None),
            ],
            id_less: vec![entry(EntryIdentity::Composite("||".into()), None, Some("Mystery"), None)],
            skipped_graded: 0,
        };

        let results = CatalogMatcher::new(&catalog, &classifier, 1)
            .match_entries(&aggregation)
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| (r.tcg_product_id, r.matched)).collect();
        assert_eq!(ids, vec![(Some(7), true), (Some(8), false), (None, false)]);
        assert_eq!(results[2].name.as_deref(), Some("Mystery"));
        assert_eq!(results[0].market_price, Some(1.5));
    }

    #[tokio::test]
    async fn test_japanese_entries_carry_checks() {
        let mut clay_burst = set(9, "SV2D: Clay Burst", CatalogLanguage::Japanese);
        clay_burst.name_other = Some("Clay Burst".into());
        let catalog = FakeCatalog {
            japan: vec![product(500, "Pikachu", &clay_burst, "045/071")],
            ..FakeCatalog::default()
        };
        let classifier = SetClassifier::new(Vec::new(), vec![clay_burst]);

        let mut probed = entry(
            EntryIdentity::Composite("clay burst|pikachu|45/71".into()),
            Some("Clay Burst"),
            Some("Pikachu (JP)"),
            Some("45/071"),
        );
        probed.is_japanese = true;
        let mut unprobed = entry(EntryIdentity::Composite("clay burst|eevee|".into()), Some("Clay Burst"), Some("Eevee"), None);
        unprobed.is_japanese = true;
        let mut fallback = entry(EntryIdentity::External(999), Some("Clay Burst"), None, Some("45/71"));
        fallback.is_japanese = true;

        let aggregation = Aggregation {
            id_bearing: vec![fallback],
            id_less: vec![probed, unprobed],
            skipped_graded: 0,
        };
        let results = CatalogMatcher::new(&catalog, &classifier, 3)
            .match_entries(&aggregation)
            .await
            .unwrap();

        assert_eq!(results[0].tcg_product_id, Some(999));
        assert!(results[0].matched);
        assert_eq!(
            results[0].japanese_checks,
            Some(JapaneseChecks { set_match: true, card_number_match: true, name_match: None })
        );

        assert_eq!(results[1].tcg_product_id, Some(500));
        assert_eq!(
            results[1].japanese_checks,
            Some(JapaneseChecks { set_match: true, card_number_match: true, name_match: Some(true) })
        );

        assert!(!results[2].matched);
        assert_eq!(
            results[2].japanese_checks,
            Some(JapaneseChecks { set_match: true, card_number_match: false, name_match: Some(false) })
        );

        let probes = catalog.probes.lock().unwrap();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[1].name.as_deref(), Some("Pikachu"));
        assert_eq!(probes[1].normalized_card_number, "45/71");
    }

    #[tokio::test]
    async fn test_catalog_failure_is_fatal() {
        let catalog = FakeCatalog {
            fail: true,
            ..FakeCatalog::default()
        };
        let classifier = SetClassifier::default();
        let aggregation = Aggregation {
            id_bearing: vec![entry(EntryIdentity::External(1), None, None, None)],
            ..Aggregation::default()
        };
        let err = CatalogMatcher::new(&catalog, &classifier, 1)
            .match_entries(&aggregation)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Catalog(_)));
    }
}
