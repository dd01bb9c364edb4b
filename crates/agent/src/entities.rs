//! Rule-based entity extraction.
//!
//! Rules run in a fixed order and their results are concatenated. Nothing is
//! de-duplicated across rules: a number that belongs to an order reference is
//! also reported as a bare quantity when no unit-qualified quantity exists.

use regex::Regex;
use shopdesk_core::domain::entity::{Entity, EntityType, FormattedEntity};

const COMMON_PRODUCTS: &[&str] = &[
    "headphones",
    "earbuds",
    "speakers",
    "soundbar",
    "microphone",
    "bluetooth",
    "wireless",
    "laptop",
    "smartphone",
    "tablet",
];

const PRODUCT_MODELS: &[&str] = &["soundwave pro x", "audiopeak max", "bassboost elite"];

const CATEGORIES: &[&str] =
    &["electronics", "audio", "computers", "accessories", "speakers", "headphones"];

#[derive(Clone, Debug)]
pub struct EntityExtractor {
    sku: Regex,
    unit_quantity: Regex,
    bare_number: Regex,
    order_number: Regex,
}

impl EntityExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            sku: Regex::new(
                r"(?i)\b(?:[A-Z]{2}-[A-Z]{3}-[0-9]{3}|[A-Z]{3}-[A-Z]{2}[0-9]{2}-[A-Z]{2})\b",
            )?,
            unit_quantity: Regex::new(r"(?i)\b([0-9]+)\s+(?:pcs|pieces|units|items)\b")?,
            bare_number: Regex::new(r"\b([0-9]+)\b")?,
            order_number: Regex::new(r"(?i)\border(?:\s+number)?(?:\s*|:)\s*#?([0-9]+)\b")?,
        })
    }

    pub fn extract_entities(&self, text: &str) -> Vec<Entity> {
        // ASCII lowering keeps byte offsets aligned with `text`.
        let normalized = text.to_ascii_lowercase();
        let mut entities = Vec::new();

        push_vocabulary(&mut entities, &normalized, COMMON_PRODUCTS, EntityType::Product);
        push_vocabulary(&mut entities, &normalized, PRODUCT_MODELS, EntityType::Product);

        for found in self.sku.find_iter(text) {
            entities.push(Entity {
                entity: EntityType::Sku,
                value: found.as_str().to_string(),
                start: found.start(),
                end: found.end(),
            });
        }

        let mut unit_quantities = 0usize;
        for captures in self.unit_quantity.captures_iter(text) {
            let (Some(whole), Some(digits)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            entities.push(Entity {
                entity: EntityType::Quantity,
                value: digits.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            });
            unit_quantities += 1;
        }

        if unit_quantities == 0 {
            for found in self.bare_number.find_iter(text) {
                entities.push(Entity {
                    entity: EntityType::Quantity,
                    value: found.as_str().to_string(),
                    start: found.start(),
                    end: found.end(),
                });
            }
        }

        for captures in self.order_number.captures_iter(text) {
            let (Some(whole), Some(digits)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            entities.push(Entity {
                entity: EntityType::OrderNumber,
                value: digits.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            });
        }

        push_vocabulary(&mut entities, &normalized, CATEGORIES, EntityType::Category);

        entities
    }
}

/// Drops source offsets before entities leave the extractor.
pub fn format_entities(entities: &[Entity]) -> Vec<FormattedEntity> {
    entities.iter().map(FormattedEntity::from).collect()
}

// First occurrence only, one entity per vocabulary term.
fn push_vocabulary(
    entities: &mut Vec<Entity>,
    normalized: &str,
    vocabulary: &[&str],
    kind: EntityType,
) {
    for term in vocabulary {
        if let Some(start) = normalized.find(term) {
            entities.push(Entity {
                entity: kind,
                value: (*term).to_string(),
                start,
                end: start + term.len(),
            });
        }
    }
}
