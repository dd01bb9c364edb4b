use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
    Quantity,
    Sku,
    Date,
    OrderNumber,
    CustomerName,
    Category,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Product,
        EntityType::Quantity,
        EntityType::Sku,
        EntityType::Date,
        EntityType::OrderNumber,
        EntityType::CustomerName,
        EntityType::Category,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Quantity => "quantity",
            Self::Sku => "sku",
            Self::Date => "date",
            Self::OrderNumber => "order_number",
            Self::CustomerName => "customer_name",
            Self::Category => "category",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown entity type `{0}`")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownEntityType(value.to_string()))
    }
}

/// A typed span of the source text. `start..end` are byte offsets and always
/// land on character boundaries of the text the entity was extracted from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub entity: EntityType,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

/// The transmitted form of an entity, without source offsets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedEntity {
    pub entity: EntityType,
    pub value: String,
}

impl From<&Entity> for FormattedEntity {
    fn from(entity: &Entity) -> Self {
        Self { entity: entity.entity, value: entity.value.clone() }
    }
}

/// Value of the first entity of `kind`, if any.
pub fn first_value(entities: &[FormattedEntity], kind: EntityType) -> Option<&str> {
    entities.iter().find(|entity| entity.entity == kind).map(|entity| entity.value.as_str())
}
