//! Purchasable test products.

use serde::{Deserialize, Serialize};

/// Kind of the basic test product.
pub const KIND_BASIC: &str = "basic";

/// Prefix shared by every premium product kind.
pub const KIND_PREMIUM_PREFIX: &str = "premium";

/// Who a product is sold to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    /// Individual buyers (`P`).
    #[serde(rename = "P")]
    Personal,
    /// Institutions (`I`).
    #[serde(rename = "I")]
    Institutional,
}

impl ProductType {
    /// The stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "P",
            Self::Institutional => "I",
        }
    }

    /// Parse a stored column value.
    #[must_use]
    pub fn from_column(value: &str) -> Option<Self> {
        match value.trim() {
            "P" | "p" => Some(Self::Personal),
            "I" | "i" => Some(Self::Institutional),
            _ => None,
        }
    }
}

/// A product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Numeric product code (`pd_num`).
    pub code: i64,
    /// Display name.
    pub name: String,
    /// Product kind (`basic`, `premium...`, `free`).
    pub kind: String,
    /// Price in KRW.
    pub price: i64,
    /// Personal or institutional.
    pub product_type: ProductType,
    /// Usage flag.
    pub active: bool,
}

impl Product {
    /// Whether this is a zero-priced personal product, the default given at signup.
    #[must_use]
    pub fn is_free_personal(&self) -> bool {
        self.active && self.price == 0 && self.product_type == ProductType::Personal
    }
}

/// Whether `kind` names the basic test.
#[must_use]
pub fn is_basic_kind(kind: &str) -> bool {
    kind == KIND_BASIC
}

/// Whether `kind` names one of the premium tests.
#[must_use]
pub fn is_premium_kind(kind: &str) -> bool {
    kind.starts_with(KIND_PREMIUM_PREFIX)
}

/// Pick the product attached to a new account's default choice.
///
/// The cheapest active free personal product wins; otherwise the first product
/// by code. `None` only when the catalog is empty.
#[must_use]
pub fn default_signup_product(products: &[Product]) -> Option<&Product> {
    products
        .iter()
        .filter(|p| p.is_free_personal())
        .min_by_key(|p| p.code)
        .or_else(|| products.iter().min_by_key(|p| p.code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(code: i64, kind: &str, price: i64, product_type: ProductType) -> Product {
        Product {
            code,
            name: format!("{kind} test"),
            kind: kind.into(),
            price,
            product_type,
            active: true,
        }
    }

    #[test]
    fn kind_predicates() {
        assert!(is_basic_kind("basic"));
        assert!(!is_basic_kind("basic-plus"));
        assert!(is_premium_kind("premium"));
        assert!(is_premium_kind("premium_career"));
        assert!(!is_premium_kind("basic"));
    }

    #[test]
    fn signup_product_prefers_free_personal() {
        let products = vec![
            product(1, "basic", 10_000, ProductType::Personal),
            product(5, "free", 0, ProductType::Personal),
            product(2, "free", 0, ProductType::Institutional),
        ];
        assert_eq!(default_signup_product(&products).unwrap().code, 5);
    }

    #[test]
    fn signup_product_falls_back_to_first() {
        let products = vec![
            product(7, "premium", 50_000, ProductType::Personal),
            product(3, "basic", 10_000, ProductType::Personal),
        ];
        assert_eq!(default_signup_product(&products).unwrap().code, 3);
        assert!(default_signup_product(&[]).is_none());
    }

    #[test]
    fn product_type_columns() {
        assert_eq!(ProductType::from_column("P"), Some(ProductType::Personal));
        assert_eq!(ProductType::from_column("I"), Some(ProductType::Institutional));
        assert_eq!(ProductType::from_column("X"), None);
    }
}
