//! # Seed Data
//!
//! Startup catalog and admin account, loaded from a TOML file such as
//! `config/seed.toml`. Keys use the same camelCase names as the JSON API.

use crate::error::{ShopError, ShopResult};
use crate::product::{NewCategory, NewProduct};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    pub admin: Option<SeedAdmin>,
    #[serde(default)]
    pub categories: Vec<NewCategory>,
    #[serde(default)]
    pub products: Vec<NewProduct>,
}

/// Admin account; the password comes from the environment, never the file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedAdmin {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl SeedData {
    /// Parse and validate seed TOML
    pub fn from_toml(toml_str: &str) -> ShopResult<Self> {
        let data: SeedData = toml::from_str(toml_str)
            .map_err(|e| ShopError::Configuration(format!("invalid seed file: {e}")))?;
        for category in &data.categories {
            category
                .validate()
                .map_err(|e| ShopError::Configuration(format!("seed category {}: {e}", category.slug)))?;
        }
        for product in &data.products {
            product
                .validate()
                .map_err(|e| ShopError::Configuration(format!("seed product {}: {e}", product.style_code)))?;
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
[admin]
email = "admin@atelier.shop"
firstName = "Atelier"
lastName = "Admin"

[[categories]]
name = "Totes"
slug = "totes"
description = "Spacious and elegant tote bags"
order = 1

[[categories]]
name = "Clutches"
slug = "clutches"
order = 3

[[products]]
name = "Aurelia Tote"
styleCode = "AT-001"
description = "Hand-stitched calfskin tote"
price = 1250.0
stock = 8
materials = ["Calfskin", "Brass"]
dimensions = "40 x 30 x 15 cm"
careInstructions = "Store in dust bag"
images = ["https://cdn.atelier.shop/at-001.jpg"]
isFeatured = true
"#;

    #[test]
    fn test_parse_seed() {
        let seed = SeedData::from_toml(SEED).unwrap();

        assert_eq!(seed.admin.unwrap().email, "admin@atelier.shop");
        assert_eq!(seed.categories.len(), 2);
        assert_eq!(seed.categories[1].order, 3);
        assert_eq!(seed.products[0].price.cents(), 125_000);
        assert!(seed.products[0].is_active);
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let bad = "[[categories]]\nname = \"\"\nslug = \"x\"\n";
        assert!(matches!(
            SeedData::from_toml(bad),
            Err(ShopError::Configuration(_))
        ));
    }
}
