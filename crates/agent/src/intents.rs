//! Keyword intent classifier used when the hosted model is unavailable.

use shopdesk_core::domain::intent::{Intent, IntentName};

/// Scores below this resolve to [`IntentName::GeneralInquiry`].
pub const MIN_INTENT_SCORE: f64 = 0.1;

/// Iteration order is the tie-break order: the first intent reaching the best
/// score wins.
pub const INTENT_PATTERNS: &[(IntentName, &[&str])] = &[
    (
        IntentName::Greeting,
        &["hello", "hi", "hey", "good morning", "good afternoon", "good evening", "howdy"],
    ),
    (
        IntentName::InventoryCheck,
        &[
            "check inventory",
            "check stock",
            "do you have",
            "how many",
            "in stock",
            "available",
            "check for",
            "stock level",
            "stock status",
        ],
    ),
    (
        IntentName::InventoryRestock,
        &[
            "restock",
            "when will",
            "back in stock",
            "get more",
            "next shipment",
            "restocking",
            "replenish",
            "new stock",
            "availability date",
            "when can i get",
        ],
    ),
    (
        IntentName::OrderStatus,
        &[
            "order status",
            "track order",
            "where is my order",
            "shipping status",
            "delivery status",
            "order #",
            "order number",
            "has my order shipped",
        ],
    ),
    (
        IntentName::OrderPlacement,
        &["place order", "buy", "purchase", "add to cart", "checkout", "ordering", "want to order"],
    ),
    (
        IntentName::ProductInquiry,
        &[
            "product details",
            "tell me about",
            "features",
            "specifications",
            "compare",
            "difference between",
            "product information",
            "what is",
            "how does",
            "description",
        ],
    ),
    (
        IntentName::ReturnsRefunds,
        &["return", "refund", "money back", "exchange", "broken", "damaged", "not working", "defective"],
    ),
    (
        IntentName::Help,
        &["help", "assist", "support", "guide", "how do i", "can you help", "need assistance"],
    ),
    (
        IntentName::Goodbye,
        &["goodbye", "bye", "see you", "thanks", "thank you", "that's all", "exit", "quit"],
    ),
    (IntentName::GeneralInquiry, &["what can you do", "capabilities", "features", "ability"]),
];

#[derive(Clone, Copy, Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Scores are the fraction of an intent's phrases present in the text, so
    /// intents with long phrase lists need more hits. Reported confidence is
    /// `0.5 + score`, saturating at 1.
    pub fn classify(&self, text: &str) -> Intent {
        let normalized = text.to_lowercase();

        let mut best = IntentName::GeneralInquiry;
        let mut best_score = 0.0_f64;
        for (intent, phrases) in INTENT_PATTERNS {
            let score = phrase_score(&normalized, phrases);
            if score > best_score {
                best = *intent;
                best_score = score;
            }
        }

        if best_score < MIN_INTENT_SCORE {
            best = IntentName::GeneralInquiry;
            best_score = 1.0;
        }

        Intent::new(best, (0.5 + best_score).min(1.0))
    }
}

fn phrase_score(normalized: &str, phrases: &[&str]) -> f64 {
    if phrases.is_empty() {
        return 0.0;
    }
    let hits = phrases.iter().filter(|phrase| normalized.contains(*phrase)).count();
    hits as f64 / phrases.len() as f64
}

#[cfg(test)]
mod tests {
    use shopdesk_core::domain::intent::IntentName;

    use super::{IntentClassifier, INTENT_PATTERNS};

    #[test]
    fn patterns_cover_every_intent_once() {
        for intent in IntentName::ALL {
            let count = INTENT_PATTERNS.iter().filter(|(name, _)| *name == intent).count();
            assert_eq!(count, 1, "{intent} should have exactly one phrase list");
        }
    }

    #[test]
    fn classifies_common_messages() {
        struct Case {
            text: &'static str,
            intent: IntentName,
        }

        let cases = vec![
            Case { text: "hello", intent: IntentName::Greeting },
            Case { text: "Good morning!", intent: IntentName::Greeting },
            Case { text: "do you have SAM-GA14-KE in stock", intent: IntentName::InventoryCheck },
            Case { text: "check stock levels please", intent: IntentName::InventoryCheck },
            Case {
                text: "When will the BassBoost Elite be back in stock?",
                intent: IntentName::InventoryRestock,
            },
            Case { text: "what's the status of order #38291", intent: IntentName::OrderStatus },
            Case { text: "track order 38290", intent: IntentName::OrderStatus },
            Case { text: "I want to order two units", intent: IntentName::OrderPlacement },
            Case { text: "tell me about the AudioPeak Max", intent: IntentName::ProductInquiry },
            Case { text: "my speaker arrived broken, refund", intent: IntentName::ReturnsRefunds },
            Case { text: "I need assistance", intent: IntentName::Help },
            Case { text: "thanks, goodbye", intent: IntentName::Goodbye },
            Case { text: "what can you do", intent: IntentName::GeneralInquiry },
        ];

        let classifier = IntentClassifier::new();
        for (index, case) in cases.iter().enumerate() {
            let intent = classifier.classify(case.text);
            assert_eq!(intent.name, case.intent, "case {index}: {}", case.text);
        }
    }

    #[test]
    fn greeting_confidence_reflects_phrase_fraction() {
        let intent = IntentClassifier::new().classify("hello");

        assert_eq!(intent.name, IntentName::Greeting);
        assert!((intent.confidence - (0.5 + 1.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn confidence_stays_between_half_and_one() {
        let classifier = IntentClassifier::new();
        for text in [
            "",
            "zzz",
            "hello hi hey good morning good afternoon good evening howdy",
            "return refund money back exchange broken damaged not working defective",
            "Do you have wireless headphones in stock? How many are available?",
            "bye",
            "12345",
        ] {
            let confidence = classifier.classify(text).confidence;
            assert!((0.5..=1.0).contains(&confidence), "{text}: {confidence}");
        }
    }

    #[test]
    fn unmatched_text_is_a_confident_general_inquiry() {
        let classifier = IntentClassifier::new();
        for text in ["", "qwerty", "12345"] {
            let intent = classifier.classify(text);
            assert_eq!(intent.name, IntentName::GeneralInquiry, "{text:?}");
            assert_eq!(intent.confidence, 1.0);
        }
    }

    #[test]
    fn ties_resolve_to_the_first_registered_intent() {
        // Greeting and help each score 1/7.
        let intent = IntentClassifier::new().classify("hey help");
        assert_eq!(intent.name, IntentName::Greeting);
    }

    #[test]
    fn shorter_phrase_lists_win_on_shared_phrases() {
        // "features" is listed for product_inquiry (1/10) and general_inquiry (1/4).
        let intent = IntentClassifier::new().classify("features");
        assert_eq!(intent.name, IntentName::GeneralInquiry);
        assert!((intent.confidence - 0.75).abs() < 1e-9);
    }
}
