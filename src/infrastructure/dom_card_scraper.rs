//! Rendered showcase card scraper
//!
//! Reads showcase cards out of a DOM snapshot taken from the browser
//! session. Every card-name node is walked up to its card container, and
//! set, number, rarity, image, quantity and graded flag are read from there.

use std::collections::HashSet;

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use tracing::debug;

use crate::domain::constants::browser::CARD_ROOT_MAX_DEPTH;
use crate::domain::showcase_item::RawItem;

/// CSS selectors of the showcase card layout
#[derive(Debug, Clone)]
pub struct CardSelectors {
    /// Card title nodes, one selector per layout variant
    pub card_names: Vec<String>,
    pub set_name: String,
    /// Containers holding the number / rarity badges
    pub number_blocks: Vec<String>,
    /// Product images, most specific first
    pub product_images: Vec<String>,
    pub quantity_candidates: String,
    pub graded_images: String,
}

impl Default for CardSelectors {
    fn default() -> Self {
        Self {
            card_names: vec![
                r"span.mt-3.text-lg.mb-1.leading-tight.font-bold.line-clamp-2.text-card-foreground".to_string(),
                r"span.place-self-start.my-auto.text-base.sm\:text-lg.font-bold.line-clamp-2".to_string(),
            ],
            set_name: "span.underline.text-muted-foreground".to_string(),
            number_blocks: vec![
                "div.flex.flex-row.flex-wrap.items-center.space-x-1.text-muted-foreground".to_string(),
                r"div.flex.flex-col.text-xs.sm\:text-sm.text-muted-foreground".to_string(),
            ],
            product_images: vec![
                r#"img[src*="public-assets/products/product_"]"#.to_string(),
                r#"img[src*="product_"]"#.to_string(),
            ],
            quantity_candidates: "span, p, div".to_string(),
            graded_images: "div.animate-in img".to_string(),
        }
    }
}

static NUMBER_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Z]{1,4}\d{1,4}(?:/\d{1,4})?|\d{1,4}/\d{1,4}|\d{1,4})").expect("valid number-like regex")
});
static SLASH_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9]{0,4}\d{1,4}/\d{1,4}").expect("valid slash number regex"));
static ALPHA_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[A-Z]{1,4}\d{1,4}$").expect("valid alpha number regex"));
static ALPHA_NUMBER_ANYWHERE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z]{1,4}\d{1,4}").expect("valid alpha number regex"));
static BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,4}$").expect("valid bare number regex"));
static HASH_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\s*(\d{1,4})\b").expect("valid hash number regex"));
static QTY_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Qty\s*:").expect("valid qty label regex"));
static QTY_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Qty\s*:\s*(\d+)").expect("valid qty regex"));
static IMAGE_PRODUCT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"product_(\d+)").expect("valid image product regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const BULLET: &str = "\u{2022}";

/// Whitespace-collapsed text of an element; `None` when blank
fn text_of(element: ElementRef<'_>) -> Option<String> {
    let raw: String = element.text().collect();
    let collapsed = WHITESPACE.replace_all(&raw, " ").trim().to_string();
    (!collapsed.is_empty()).then_some(collapsed)
}

fn looks_like_number(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !trimmed.contains('.') && NUMBER_LIKE.is_match(trimmed)
}

/// Best card number among badge texts: slash form, then letter-prefixed,
/// then bare digits
fn pick_number(values: &[String]) -> Option<String> {
    let candidates: Vec<&str> = values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).collect();
    candidates
        .iter()
        .find(|v| SLASH_NUMBER.is_match(v))
        .or_else(|| candidates.iter().find(|v| ALPHA_NUMBER.is_match(v)))
        .or_else(|| candidates.iter().find(|v| BARE_NUMBER.is_match(v)))
        .map(|v| (*v).to_string())
}

fn number_from_text(text: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let collapsed = collapsed.trim();
    if collapsed.is_empty() {
        return None;
    }
    SLASH_NUMBER
        .find(collapsed)
        .or_else(|| ALPHA_NUMBER_ANYWHERE.find(collapsed))
        .map(|m| m.as_str().to_string())
        .or_else(|| HASH_NUMBER.captures(collapsed).map(|caps| caps[1].to_string()))
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Invalid card selector {selector}: {e}"))
}

pub struct DomCardScraper {
    card_names: Vec<Selector>,
    set_name: Selector,
    number_blocks: Vec<Selector>,
    product_images: Vec<Selector>,
    quantity_candidates: Selector,
    graded_images: Selector,
    spans: Selector,
    article: Selector,
}

impl DomCardScraper {
    pub fn new() -> Result<Self> {
        Self::with_selectors(&CardSelectors::default())
    }

    pub fn with_selectors(selectors: &CardSelectors) -> Result<Self> {
        let parse_all = |list: &[String]| list.iter().map(|s| parse_selector(s)).collect::<Result<Vec<_>>>();
        Ok(Self {
            card_names: parse_all(&selectors.card_names)?,
            set_name: parse_selector(&selectors.set_name)?,
            number_blocks: parse_all(&selectors.number_blocks)?,
            product_images: parse_all(&selectors.product_images)?,
            quantity_candidates: parse_selector(&selectors.quantity_candidates)?,
            graded_images: parse_selector(&selectors.graded_images)?,
            spans: parse_selector("span")?,
            article: parse_selector("article")?,
        })
    }

    /// One raw item per distinct card container
    pub fn scrape(&self, html: &str) -> Vec<RawItem> {
        let document = Html::parse_document(html);
        let mut seen_names = HashSet::new();
        let mut seen_cards = HashSet::new();
        let mut items = Vec::new();

        let name_nodes = self.card_names.iter().flat_map(|selector| document.select(selector));
        for name_node in name_nodes {
            if !seen_names.insert(name_node.id()) {
                continue;
            }
            let Some(card) = self.card_root(name_node) else { continue };
            if !seen_cards.insert(card.id()) {
                continue;
            }
            if let Some(item) = self.read_card(card, name_node) {
                items.push(item);
            }
        }

        debug!("Scraped {} cards from the rendered page", items.len());
        items
    }

    fn is_card_container(&self, element: ElementRef<'_>) -> bool {
        if element.value().attr("data-slot") == Some("card") {
            return true;
        }
        if element.select(&self.set_name).next().is_none() {
            return false;
        }
        self.number_blocks.iter().any(|selector| element.select(selector).next().is_some())
            || element
                .select(&self.spans)
                .any(|span| text_of(span).is_some_and(|text| looks_like_number(&text)))
    }

    fn card_root<'a>(&self, name_node: ElementRef<'a>) -> Option<ElementRef<'a>> {
        let mut current = Some(name_node);
        for _ in 0..CARD_ROOT_MAX_DEPTH {
            let Some(element) = current else { break };
            if self.is_card_container(element) {
                return Some(element);
            }
            current = element.parent().and_then(ElementRef::wrap);
        }

        let closest = |matches: &dyn Fn(ElementRef<'a>) -> bool| {
            std::iter::successors(Some(name_node), |element| element.parent().and_then(ElementRef::wrap))
                .find(|element| matches(*element))
        };
        closest(&|element| element.value().attr("data-slot") == Some("card"))
            .or_else(|| closest(&|element| self.article.matches(&element)))
            .or_else(|| name_node.parent().and_then(ElementRef::wrap))
    }

    fn read_card(&self, card: ElementRef<'_>, name_node: ElementRef<'_>) -> Option<RawItem> {
        let name = text_of(name_node);
        let set_name = card.select(&self.set_name).next().and_then(text_of);

        let mut card_number = None;
        let mut rarity = None;
        if let Some(block) = self.number_blocks.iter().find_map(|selector| card.select(selector).next()) {
            let values: Vec<String> = block.select(&self.spans).filter_map(text_of).collect();
            card_number = pick_number(&values);
            if let Some(bullet) = values.iter().position(|value| value == BULLET) {
                if bullet > 0 {
                    rarity = Some(values[bullet - 1].clone());
                }
            }
        }
        if card_number.is_none() {
            let values: Vec<String> = card.select(&self.spans).filter_map(text_of).collect();
            card_number = pick_number(&values);
        }
        if card_number.is_none() {
            card_number = number_from_text(&card.text().collect::<String>());
        }

        let image_url = self
            .product_images
            .iter()
            .find_map(|selector| card.select(selector).next())
            .and_then(|image| image.value().attr("src"))
            .unwrap_or_default()
            .to_string();
        let product_id = IMAGE_PRODUCT_ID
            .captures(&image_url)
            .map(|caps| caps[1].to_string());

        let quantity = card
            .select(&self.quantity_candidates)
            .map(|element| element.text().collect::<String>())
            .find(|text| QTY_LABEL.is_match(text))
            .and_then(|text| QTY_VALUE.captures(&text).map(|caps| caps[1].to_string()));

        let graded = card.select(&self.graded_images).count() >= 2;

        if name.is_none() && set_name.is_none() && card_number.is_none() && image_url.is_empty() {
            return None;
        }

        Some(json!({
            "product_id": product_id,
            "image_url": image_url,
            "product_name": name,
            "catalog_group": set_name,
            "card_number": card_number,
            "rarity": rarity,
            "quantity": quantity.unwrap_or_else(|| "1".to_string()),
            "grade_id": if graded { Value::from("1") } else { Value::Null },
        }))
    }
}
