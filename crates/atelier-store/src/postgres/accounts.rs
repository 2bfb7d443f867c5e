//! Users, addresses and device tokens.

use super::rows::{AddressRow, UserRow, ADDRESS_COLUMNS, USER_COLUMNS};
use super::PgStore;
use crate::storage_error;
use async_trait::async_trait;
use atelier_core::store::{AddressStore, DeviceStore, UserStore};
use atelier_core::user::normalize_email;
use atelier_core::{Address, AddressPatch, NewAddress, NewUser, ShopError, ShopResult, User};
use chrono::Utc;
use sqlx::{Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

#[async_trait]
impl UserStore for PgStore {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create_user(&self, user: NewUser) -> ShopResult<User> {
        let user = user.into_user();
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.phone)
            .bind(user.role.as_str())
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match storage_error(e) {
                ShopError::Conflict(_) => ShopError::Conflict("Email already registered".to_string()),
                other => other,
            })?;
        row.try_into()
    }

    async fn find_user(&self, id: Uuid) -> ShopResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> ShopResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn upsert_user(&self, user: NewUser) -> ShopResult<User> {
        let user = user.into_user();
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (email) DO UPDATE SET password_hash = EXCLUDED.password_hash, \
             first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name, \
             phone = EXCLUDED.phone, role = EXCLUDED.role \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.phone)
            .bind(user.role.as_str())
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?
            .try_into()
    }
}

async fn lock_address(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    id: Uuid,
) -> ShopResult<Address> {
    let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1 AND user_id = $2 FOR UPDATE");
    sqlx::query_as::<_, AddressRow>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error)?
        .map(Address::from)
        .ok_or_else(|| ShopError::not_found("Address", id))
}

async fn clear_default(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> ShopResult<()> {
    sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND is_default")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?;
    Ok(())
}

async fn write_address(tx: &mut Transaction<'_, Postgres>, address: &Address) -> ShopResult<Address> {
    let sql = format!(
        "UPDATE addresses SET full_name = $2, phone = $3, address_line1 = $4, address_line2 = $5, \
         city = $6, state = $7, zip_code = $8, country = $9, is_default = $10, updated_at = $11 \
         WHERE id = $1 RETURNING {ADDRESS_COLUMNS}"
    );
    let row = sqlx::query_as::<_, AddressRow>(&sql)
        .bind(address.id)
        .bind(&address.full_name)
        .bind(&address.phone)
        .bind(&address.address_line1)
        .bind(&address.address_line2)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zip_code)
        .bind(&address.country)
        .bind(address.is_default)
        .bind(Utc::now())
        .fetch_one(&mut **tx)
        .await
        .map_err(storage_error)?;
    Ok(row.into())
}

#[async_trait]
impl AddressStore for PgStore {
    async fn list_addresses(&self, user_id: Uuid) -> ShopResult<Vec<Address>> {
        let sql = format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE user_id = $1 \
             ORDER BY is_default DESC, created_at DESC"
        );
        let rows = sqlx::query_as::<_, AddressRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(Address::from).collect())
    }

    async fn find_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<Option<Address>> {
        let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, AddressRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.map(Address::from))
    }

    #[instrument(skip(self, address))]
    async fn create_address(&self, user_id: Uuid, address: NewAddress) -> ShopResult<Address> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM addresses WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?;
        let is_default = existing == 0 || address.is_default;
        if is_default {
            clear_default(&mut tx, user_id).await?;
        }

        let address = address.into_address(user_id, is_default);
        let sql = format!(
            "INSERT INTO addresses ({ADDRESS_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {ADDRESS_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AddressRow>(&sql)
            .bind(address.id)
            .bind(address.user_id)
            .bind(&address.full_name)
            .bind(&address.phone)
            .bind(&address.address_line1)
            .bind(&address.address_line2)
            .bind(&address.city)
            .bind(&address.state)
            .bind(&address.zip_code)
            .bind(&address.country)
            .bind(address.is_default)
            .bind(address.created_at)
            .bind(address.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(row.into())
    }

    async fn update_address(&self, user_id: Uuid, id: Uuid, patch: AddressPatch) -> ShopResult<Address> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut address = lock_address(&mut tx, user_id, id).await?;

        let make_default = patch.is_default == Some(true);
        address.apply(patch);
        if make_default && !address.is_default {
            clear_default(&mut tx, user_id).await?;
            address.is_default = true;
        }

        let updated = write_address(&mut tx, &address).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(updated)
    }

    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let address = lock_address(&mut tx, user_id, id).await?;

        let (referenced,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM orders WHERE address_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_error)?;
        if referenced {
            return Err(ShopError::InvalidRequest(
                "Address is used by an order and cannot be deleted".to_string(),
            ));
        }

        sqlx::query("DELETE FROM addresses WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        if address.is_default {
            sqlx::query(
                "UPDATE addresses SET is_default = TRUE, updated_at = now() WHERE id = \
                 (SELECT id FROM addresses WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1)",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<Address> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut address = lock_address(&mut tx, user_id, id).await?;
        clear_default(&mut tx, user_id).await?;
        address.is_default = true;
        let updated = write_address(&mut tx, &address).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(updated)
    }
}

#[async_trait]
impl DeviceStore for PgStore {
    async fn register_device(&self, user_id: Uuid, token: &str, platform: Option<&str>) -> ShopResult<()> {
        sqlx::query(
            "INSERT INTO device_tokens (token, user_id, platform) VALUES ($1, $2, $3) \
             ON CONFLICT (token) DO UPDATE SET user_id = EXCLUDED.user_id, \
             platform = EXCLUDED.platform, updated_at = now()",
        )
        .bind(token)
        .bind(user_id)
        .bind(platform)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn device_tokens(&self, user_id: Uuid) -> ShopResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT token FROM device_tokens WHERE user_id = $1 ORDER BY token")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    async fn remove_device_tokens(&self, tokens: &[String]) -> ShopResult<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM device_tokens WHERE token = ANY($1)")
            .bind(tokens)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}
