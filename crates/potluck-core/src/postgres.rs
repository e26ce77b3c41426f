use crate::error::PlannerError;
use crate::store::{BoardRows, PlannerStore, ShiftRow};
use crate::types::{Category, Item, NewItem, Pledge, Profile, Shift, Signup};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// PostgreSQL store backend.
///
/// The aggregate update is a single `committed_total = committed_total + $n`
/// statement and the signup insert runs in a transaction that locks the shift
/// row, so both shared mutations stay atomic inside the database.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

fn decode_err(e: sqlx::Error) -> PlannerError {
    PlannerError::Store(format!("postgres decode failed: {e}"))
}

impl PostgresStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, PlannerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), PlannerError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                position BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                category_id BIGINT NOT NULL REFERENCES categories (id),
                name TEXT NOT NULL,
                description TEXT NULL,
                committed_total BIGINT NOT NULL DEFAULT 0,
                max_needed BIGINT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pledges (
                user_id TEXT NOT NULL,
                item_id BIGINT NOT NULL REFERENCES items (id),
                count BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (user_id, item_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS shifts (
                id BIGINT PRIMARY KEY,
                event_name TEXT NOT NULL,
                description TEXT NULL,
                starts_at TIMESTAMPTZ NOT NULL,
                ends_at TIMESTAMPTZ NOT NULL,
                capacity BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS shift_signups (
                user_id TEXT NOT NULL,
                shift_id BIGINT NOT NULL REFERENCES shifts (id),
                joined_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (user_id, shift_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_pledges_item_id ON pledges (item_id)",
            "CREATE INDEX IF NOT EXISTS idx_shift_signups_shift_id ON shift_signups (shift_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PlannerError::Store(format!("postgres schema create failed: {e}")))?;
        }

        Ok(())
    }

    async fn item_exists(&self, item_id: i64) -> Result<bool, PlannerError> {
        let row = sqlx::query("SELECT 1 FROM items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres item lookup failed: {e}")))?;
        Ok(row.is_some())
    }

    async fn all_profiles(&self) -> Result<Vec<Profile>, PlannerError> {
        let rows = sqlx::query("SELECT user_id, name FROM profiles ORDER BY user_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres profiles load failed: {e}")))?;

        rows.into_iter()
            .map(|row| {
                Ok(Profile {
                    user_id: row.try_get("user_id").map_err(decode_err)?,
                    name: row.try_get("name").map_err(decode_err)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PlannerStore for PostgresStore {
    async fn pledge_count(
        &self,
        user_id: &str,
        item_id: i64,
    ) -> Result<Option<i64>, PlannerError> {
        let row = sqlx::query("SELECT count FROM pledges WHERE user_id = $1 AND item_id = $2")
            .bind(user_id)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres pledge lookup failed: {e}")))?;

        row.map(|row| row.try_get("count").map_err(decode_err))
            .transpose()
    }

    async fn upsert_pledge(
        &self,
        user_id: &str,
        item_id: i64,
        count: i64,
    ) -> Result<(), PlannerError> {
        if !self.item_exists(item_id).await? {
            return Err(PlannerError::UnknownItem(item_id));
        }

        sqlx::query(
            r#"
            INSERT INTO pledges (user_id, item_id, count, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, item_id)
            DO UPDATE SET count = EXCLUDED.count, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(count)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::Store(format!("postgres pledge upsert failed: {e}")))?;

        Ok(())
    }

    async fn apply_total_delta(&self, item_id: i64, delta: i64) -> Result<(), PlannerError> {
        let result =
            sqlx::query("UPDATE items SET committed_total = committed_total + $2 WHERE id = $1")
                .bind(item_id)
                .bind(delta)
                .execute(&self.pool)
                .await
                .map_err(|e| PlannerError::Store(format!("postgres total update failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(PlannerError::UnknownItem(item_id));
        }
        Ok(())
    }

    async fn sum_pledges(&self, item_id: i64) -> Result<i64, PlannerError> {
        if !self.item_exists(item_id).await? {
            return Err(PlannerError::UnknownItem(item_id));
        }

        let row = sqlx::query(
            "SELECT COALESCE(SUM(count), 0) AS total FROM pledges WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PlannerError::Store(format!("postgres pledge sum failed: {e}")))?;

        row.try_get("total").map_err(decode_err)
    }

    async fn write_total(&self, item_id: i64, total: i64) -> Result<(), PlannerError> {
        let result = sqlx::query("UPDATE items SET committed_total = $2 WHERE id = $1")
            .bind(item_id)
            .bind(total)
            .execute(&self.pool)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres total write failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(PlannerError::UnknownItem(item_id));
        }
        Ok(())
    }

    async fn insert_item(&self, creator: &str, draft: NewItem) -> Result<Item, PlannerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PlannerError::Store(format!("postgres item begin failed: {e}")))?;

        let category = sqlx::query("SELECT 1 FROM categories WHERE id = $1")
            .bind(draft.category_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres category lookup failed: {e}")))?;
        if category.is_none() {
            return Err(PlannerError::UnknownCategory(draft.category_id));
        }

        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO items (category_id, name, description, committed_total, max_needed, created_at)
            VALUES ($1, $2, $3, 0, $4, $5)
            RETURNING id
            "#,
        )
        .bind(draft.category_id)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.max_needed)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| PlannerError::Store(format!("postgres item insert failed: {e}")))?;
        let id: i64 = row.try_get("id").map_err(decode_err)?;

        sqlx::query(
            "INSERT INTO pledges (user_id, item_id, count, updated_at) VALUES ($1, $2, 0, $3)",
        )
        .bind(creator)
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| PlannerError::Store(format!("postgres creator pledge insert failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| PlannerError::Store(format!("postgres item commit failed: {e}")))?;

        Ok(Item {
            id,
            category_id: draft.category_id,
            name: draft.name,
            description: draft.description,
            committed_total: 0,
            max_needed: draft.max_needed,
            created_at: now,
        })
    }

    async fn board_rows(&self) -> Result<BoardRows, PlannerError> {
        let category_rows =
            sqlx::query("SELECT id, name, position, created_at FROM categories ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    PlannerError::Store(format!("postgres categories load failed: {e}"))
                })?;

        let categories = category_rows
            .into_iter()
            .map(|row| {
                Ok(Category {
                    id: row.try_get("id").map_err(decode_err)?,
                    name: row.try_get("name").map_err(decode_err)?,
                    position: row.try_get("position").map_err(decode_err)?,
                    created_at: row.try_get("created_at").map_err(decode_err)?,
                })
            })
            .collect::<Result<Vec<_>, PlannerError>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT id, category_id, name, description, committed_total, max_needed, created_at
            FROM items
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PlannerError::Store(format!("postgres items load failed: {e}")))?;

        let items = item_rows
            .into_iter()
            .map(|row| {
                Ok(Item {
                    id: row.try_get("id").map_err(decode_err)?,
                    category_id: row.try_get("category_id").map_err(decode_err)?,
                    name: row.try_get("name").map_err(decode_err)?,
                    description: row.try_get("description").map_err(decode_err)?,
                    committed_total: row.try_get("committed_total").map_err(decode_err)?,
                    max_needed: row.try_get("max_needed").map_err(decode_err)?,
                    created_at: row.try_get("created_at").map_err(decode_err)?,
                })
            })
            .collect::<Result<Vec<_>, PlannerError>>()?;

        let pledge_rows =
            sqlx::query("SELECT user_id, item_id, count, updated_at FROM pledges")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| PlannerError::Store(format!("postgres pledges load failed: {e}")))?;

        let pledges = pledge_rows
            .into_iter()
            .map(|row| {
                Ok(Pledge {
                    user_id: row.try_get("user_id").map_err(decode_err)?,
                    item_id: row.try_get("item_id").map_err(decode_err)?,
                    count: row.try_get("count").map_err(decode_err)?,
                    updated_at: row.try_get("updated_at").map_err(decode_err)?,
                })
            })
            .collect::<Result<Vec<_>, PlannerError>>()?;

        Ok(BoardRows {
            categories,
            items,
            pledges,
            profiles: self.all_profiles().await?,
        })
    }

    async fn list_shifts(&self) -> Result<Vec<ShiftRow>, PlannerError> {
        let shift_rows = sqlx::query(
            r#"
            SELECT id, event_name, description, starts_at, ends_at, capacity
            FROM shifts
            ORDER BY starts_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PlannerError::Store(format!("postgres shifts load failed: {e}")))?;

        let shifts = shift_rows
            .into_iter()
            .map(|row| {
                Ok(Shift {
                    id: row.try_get("id").map_err(decode_err)?,
                    event_name: row.try_get("event_name").map_err(decode_err)?,
                    description: row.try_get("description").map_err(decode_err)?,
                    starts_at: row.try_get("starts_at").map_err(decode_err)?,
                    ends_at: row.try_get("ends_at").map_err(decode_err)?,
                    capacity: row.try_get("capacity").map_err(decode_err)?,
                })
            })
            .collect::<Result<Vec<_>, PlannerError>>()?;

        let signup_rows = sqlx::query("SELECT user_id, shift_id, joined_at FROM shift_signups")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres signups load failed: {e}")))?;

        let signups = signup_rows
            .into_iter()
            .map(|row| {
                Ok(Signup {
                    user_id: row.try_get("user_id").map_err(decode_err)?,
                    shift_id: row.try_get("shift_id").map_err(decode_err)?,
                    joined_at: row.try_get("joined_at").map_err(decode_err)?,
                })
            })
            .collect::<Result<Vec<_>, PlannerError>>()?;

        let profiles = self.all_profiles().await?;

        Ok(shifts
            .into_iter()
            .map(|shift| ShiftRow {
                signups: signups
                    .iter()
                    .filter(|signup| signup.shift_id == shift.id)
                    .cloned()
                    .collect(),
                profiles: profiles.clone(),
                shift,
            })
            .collect())
    }

    async fn insert_signup_below_capacity(
        &self,
        user_id: &str,
        shift_id: i64,
    ) -> Result<bool, PlannerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PlannerError::Store(format!("postgres signup begin failed: {e}")))?;

        // Concurrent signups serialize on the locked shift row. Under READ
        // COMMITTED, a bare capacity subquery runs against each statement's
        // own snapshot and lets two sessions racing for the last slot both
        // pass; the lock forces the second session to count after the first
        // has committed its row.
        let shift = sqlx::query("SELECT capacity FROM shifts WHERE id = $1 FOR UPDATE")
            .bind(shift_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres shift lock failed: {e}")))?;
        let capacity: i64 = match shift {
            Some(row) => row.try_get("capacity").map_err(decode_err)?,
            None => return Err(PlannerError::UnknownShift(shift_id)),
        };

        let existing =
            sqlx::query("SELECT 1 FROM shift_signups WHERE user_id = $1 AND shift_id = $2")
                .bind(user_id)
                .bind(shift_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    PlannerError::Store(format!("postgres signup lookup failed: {e}"))
                })?;
        if existing.is_some() {
            tx.commit()
                .await
                .map_err(|e| PlannerError::Store(format!("postgres signup commit failed: {e}")))?;
            return Ok(true);
        }

        let filled_row =
            sqlx::query("SELECT COUNT(*) AS filled FROM shift_signups WHERE shift_id = $1")
                .bind(shift_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| PlannerError::Store(format!("postgres signup count failed: {e}")))?;
        let filled: i64 = filled_row.try_get("filled").map_err(decode_err)?;
        if filled >= capacity {
            tx.rollback()
                .await
                .map_err(|e| {
                    PlannerError::Store(format!("postgres signup rollback failed: {e}"))
                })?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO shift_signups (user_id, shift_id, joined_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(shift_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres signup insert failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| PlannerError::Store(format!("postgres signup commit failed: {e}")))?;

        Ok(true)
    }

    async fn delete_signup(&self, user_id: &str, shift_id: i64) -> Result<(), PlannerError> {
        sqlx::query("DELETE FROM shift_signups WHERE user_id = $1 AND shift_id = $2")
            .bind(user_id)
            .bind(shift_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PlannerError::Store(format!("postgres signup delete failed: {e}")))?;

        Ok(())
    }
}
