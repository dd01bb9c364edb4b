use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of intents the assistant understands.
///
/// Declaration order is significant: it is the order in which the keyword
/// classifier evaluates intents, so earlier variants win score ties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentName {
    Greeting,
    InventoryCheck,
    InventoryRestock,
    OrderStatus,
    OrderPlacement,
    ProductInquiry,
    ReturnsRefunds,
    Help,
    Goodbye,
    GeneralInquiry,
}

impl IntentName {
    pub const ALL: [IntentName; 10] = [
        IntentName::Greeting,
        IntentName::InventoryCheck,
        IntentName::InventoryRestock,
        IntentName::OrderStatus,
        IntentName::OrderPlacement,
        IntentName::ProductInquiry,
        IntentName::ReturnsRefunds,
        IntentName::Help,
        IntentName::Goodbye,
        IntentName::GeneralInquiry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::InventoryCheck => "inventory_check",
            Self::InventoryRestock => "inventory_restock",
            Self::OrderStatus => "order_status",
            Self::OrderPlacement => "order_placement",
            Self::ProductInquiry => "product_inquiry",
            Self::ReturnsRefunds => "returns_refunds",
            Self::Help => "help",
            Self::Goodbye => "goodbye",
            Self::GeneralInquiry => "general_inquiry",
        }
    }
}

impl fmt::Display for IntentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown intent `{0}`")]
pub struct UnknownIntent(pub String);

impl FromStr for IntentName {
    type Err = UnknownIntent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| UnknownIntent(value.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: IntentName,
    pub confidence: f64,
}

impl Intent {
    /// Builds an intent with confidence clamped into `[0, 1]`. NaN becomes zero.
    pub fn new(name: IntentName, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self { name, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::{Intent, IntentName};

    #[test]
    fn intent_names_round_trip_through_wire_strings() {
        for intent in IntentName::ALL {
            let parsed: IntentName = intent.as_str().parse().expect("known intent");
            assert_eq!(parsed, intent);
            let json = serde_json::to_string(&intent).expect("serialize");
            assert_eq!(json, format!("\"{}\"", intent.as_str()));
        }
    }

    #[test]
    fn unknown_intent_name_is_rejected() {
        let error = "order_cancellation".parse::<IntentName>().expect_err("must fail");
        assert_eq!(error.0, "order_cancellation");
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(Intent::new(IntentName::Help, 1.7).confidence, 1.0);
        assert_eq!(Intent::new(IntentName::Help, -0.2).confidence, 0.0);
        assert_eq!(Intent::new(IntentName::Help, f64::NAN).confidence, 0.0);
        assert_eq!(Intent::new(IntentName::Help, 0.42).confidence, 0.42);
    }
}
