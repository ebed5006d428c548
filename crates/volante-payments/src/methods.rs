use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use volante_core::error::{Error, Result};
use volante_core::models::PaymentMethod;
use volante_core::store::{Entity, EntityStore, Predicate, Repository};

/// Brand detection by number prefix. Elo shares leading digits with visa and
/// mastercard, so its longer prefixes are checked first.
const BRAND_PREFIXES: &[(&str, &[&str])] = &[
    (
        "elo",
        &[
            "4011", "4312", "4389", "4514", "4576", "5041", "5066", "5067", "6277", "6362",
            "6363", "6504", "6505", "6516",
        ],
    ),
    ("hipercard", &["3841", "6062"]),
    ("mastercard", &["51", "52", "53", "54", "55"]),
    ("amex", &["34", "37"]),
    ("visa", &["4"]),
];

/// Card intake form. Only derived fields survive validation; the number and
/// CVV are dropped on the floor.
#[derive(Debug, Clone)]
pub struct CardInput {
    pub card_number: String,
    pub cardholder_name: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub cvv: String,
}

pub struct PaymentMethodService {
    methods: Repository<PaymentMethod>,
}

impl PaymentMethodService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        PaymentMethodService {
            methods: Repository::new(store),
        }
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<PaymentMethod>> {
        let predicate = Predicate::default().field("created_by", owner);
        self.methods.filter(&predicate).await
    }

    pub async fn default_method(&self, owner: &str) -> Result<Option<PaymentMethod>> {
        let predicate = Predicate::default()
            .field("created_by", owner)
            .field("is_default", true);
        self.methods.find_one(&predicate).await
    }

    /// Validates the raw card data and stores the derived metadata. The
    /// first stored card becomes the owner's default.
    pub async fn add(&self, owner: &str, card: CardInput) -> Result<PaymentMethod> {
        let digits = validate(&card)?;
        let existing = self.list(owner).await?;

        let now = Utc::now();
        let method = PaymentMethod {
            id: Uuid::new_v4(),
            created_by: owner.to_string(),
            card_brand: detect_brand(&digits).to_string(),
            card_last4: digits[digits.len() - 4..].to_string(),
            cardholder_name: card.cardholder_name.trim().to_string(),
            expiry_month: card.expiry_month,
            expiry_year: card.expiry_year,
            is_default: existing.is_empty(),
            created_date: now,
            updated_date: now,
        };
        self.methods.create(&method).await
    }

    /// Promotes one card to default, clearing the flag on every other card
    /// the owner holds (at most one default at any time).
    pub async fn set_default(&self, owner: &str, id: Uuid) -> Result<PaymentMethod> {
        let methods = self.list(owner).await?;
        let mut target = methods
            .iter()
            .find(|method| method.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found(PaymentMethod::COLLECTION, id))?;

        for mut method in methods {
            if method.id != id && method.is_default {
                method.is_default = false;
                self.methods.update(&method).await?;
            }
        }

        target.is_default = true;
        self.methods.update(&target).await
    }

    pub async fn remove(&self, owner: &str, id: Uuid) -> Result<()> {
        let methods = self.list(owner).await?;
        if !methods.iter().any(|method| method.id == id) {
            return Err(Error::not_found(PaymentMethod::COLLECTION, id));
        }
        self.methods.delete(id).await
    }

    pub(crate) async fn get_owned(&self, owner: &str, id: Uuid) -> Result<PaymentMethod> {
        let method = self.methods.get(id).await?;
        if method.created_by != owner {
            return Err(Error::not_found(PaymentMethod::COLLECTION, id));
        }
        Ok(method)
    }
}

fn validate(card: &CardInput) -> Result<String> {
    let digits: String = card
        .card_number
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation("card_number", "card number must be numeric"));
    }
    if digits.len() < 13 || digits.len() > 19 {
        return Err(Error::validation("card_number", "invalid card number length"));
    }
    if card.cardholder_name.trim().is_empty() {
        return Err(Error::validation("cardholder_name", "cardholder name is required"));
    }
    if card.expiry_month == 0 || card.expiry_month > 12 {
        return Err(Error::validation("expiry_month", "invalid expiry month"));
    }
    if card.expiry_year == 0 {
        return Err(Error::validation("expiry_year", "expiry year is required"));
    }
    if card.cvv.len() < 3 || !card.cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation("cvv", "invalid cvv"));
    }
    Ok(digits)
}

fn detect_brand(digits: &str) -> &'static str {
    for &(brand, prefixes) in BRAND_PREFIXES {
        if prefixes.iter().any(|prefix| digits.starts_with(prefix)) {
            return brand;
        }
    }
    "visa"
}

#[cfg(test)]
mod tests {
    use super::*;
    use volante_store::MemoryStore;

    fn service() -> PaymentMethodService {
        PaymentMethodService::new(Arc::new(MemoryStore::new()))
    }

    fn card(number: &str) -> CardInput {
        CardInput {
            card_number: number.to_string(),
            cardholder_name: "ANA M SILVA".to_string(),
            expiry_month: 12,
            expiry_year: 2030,
            cvv: "123".to_string(),
        }
    }

    #[test]
    fn brand_detection_by_prefix() {
        assert_eq!(detect_brand("4111111111111111"), "visa");
        assert_eq!(detect_brand("5500000000000004"), "mastercard");
        assert_eq!(detect_brand("371449635398431"), "amex");
        assert_eq!(detect_brand("4011780000000000"), "elo");
        assert_eq!(detect_brand("6062820000000000"), "hipercard");
    }

    #[tokio::test]
    async fn add_stores_derived_fields_only() {
        let methods = service();
        let stored = methods
            .add("ana@example.com", card("4111 1111 1111 1111"))
            .await
            .expect("add");

        assert_eq!(stored.card_brand, "visa");
        assert_eq!(stored.card_last4, "1111");
        assert!(stored.is_default, "first card becomes default");
    }

    #[tokio::test]
    async fn rejects_malformed_numbers() {
        let methods = service();
        let too_short = methods
            .add("ana@example.com", card("4111"))
            .await
            .expect_err("too short");
        assert!(matches!(too_short, Error::Validation { field: "card_number", .. }));

        let not_numeric = methods
            .add("ana@example.com", card("4111-1111-1111-1111"))
            .await
            .expect_err("not numeric");
        assert!(matches!(not_numeric, Error::Validation { field: "card_number", .. }));
    }

    #[tokio::test]
    async fn at_most_one_default_per_owner() {
        let methods = service();
        let first = methods
            .add("ana@example.com", card("4111111111111111"))
            .await
            .expect("first");
        let second = methods
            .add("ana@example.com", card("5500000000000004"))
            .await
            .expect("second");
        assert!(first.is_default);
        assert!(!second.is_default);

        methods
            .set_default("ana@example.com", second.id)
            .await
            .expect("set default");

        let all = methods.list("ana@example.com").await.expect("list");
        let defaults: Vec<_> = all.iter().filter(|m| m.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
    }

    #[tokio::test]
    async fn set_default_on_foreign_card_is_not_found() {
        let methods = service();
        let mine = methods
            .add("ana@example.com", card("4111111111111111"))
            .await
            .expect("add");

        let err = methods
            .set_default("intruder@example.com", mine.id)
            .await
            .expect_err("foreign card");
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
