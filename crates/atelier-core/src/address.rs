//! # Address Book
//!
//! Shipping addresses. Each user has at most one default address; the
//! first address a user creates becomes the default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Address {
    pub fn apply(&mut self, patch: AddressPatch) {
        if let Some(v) = patch.full_name {
            self.full_name = v;
        }
        if let Some(v) = patch.phone {
            self.phone = v;
        }
        if let Some(v) = patch.address_line1 {
            self.address_line1 = v;
        }
        if let Some(v) = patch.address_line2 {
            self.address_line2 = Some(v);
        }
        if let Some(v) = patch.city {
            self.city = v;
        }
        if let Some(v) = patch.state {
            self.state = v;
        }
        if let Some(v) = patch.zip_code {
            self.zip_code = v;
        }
        if let Some(v) = patch.country {
            self.country = v;
        }
        self.updated_at = Utc::now();
    }
}

fn default_country() -> String {
    "USA".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAddress {
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 1))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub address_line1: String,
    pub address_line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub zip_code: String,
    #[serde(default = "default_country")]
    #[validate(length(min = 1))]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

impl NewAddress {
    /// Build the stored row; `is_default` is decided by the store
    pub fn into_address(self, user_id: Uuid, is_default: bool) -> Address {
        let now = Utc::now();
        Address {
            id: Uuid::new_v4(),
            user_id,
            full_name: self.full_name,
            phone: self.phone,
            address_line1: self.address_line1,
            address_line2: self.address_line2,
            city: self.city,
            state: self.state,
            zip_code: self.zip_code,
            country: self.country,
            is_default,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `is_default: Some(true)` makes the address the default.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressPatch {
    #[validate(length(min = 1))]
    pub full_name: Option<String>,
    #[validate(length(min = 1))]
    pub phone: Option<String>,
    #[validate(length(min = 1))]
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: Option<String>,
    #[validate(length(min = 1))]
    pub state: Option<String>,
    #[validate(length(min = 1))]
    pub zip_code: Option<String>,
    #[validate(length(min = 1))]
    pub country: Option<String>,
    pub is_default: Option<bool>,
}

/// Sort for listing: default first, then newest first
pub fn sort_for_listing(addresses: &mut [Address]) {
    addresses.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_address() -> NewAddress {
        serde_json::from_value(serde_json::json!({
            "fullName": "Ada Lovelace",
            "phone": "+1 555 0100",
            "addressLine1": "1 Savile Row",
            "city": "New York",
            "state": "NY",
            "zipCode": "10001"
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_from_json() {
        let input = new_address();
        assert_eq!(input.country, "USA");
        assert!(!input.is_default);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_sort_default_first_then_newest() {
        let user = Uuid::new_v4();
        let mut old_default = new_address().into_address(user, true);
        old_default.created_at -= Duration::days(3);
        let mut older = new_address().into_address(user, false);
        older.created_at -= Duration::days(2);
        let newest = new_address().into_address(user, false);

        let mut list = vec![older.clone(), newest.clone(), old_default.clone()];
        sort_for_listing(&mut list);

        let ids: Vec<Uuid> = list.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![old_default.id, newest.id, older.id]);
    }
}
