use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::time::Duration;

use crate::models::{pair_key, Gender, Match, MatchId, PairingCommit, ProfileUpdate, User, UserId, UserState};
use crate::services::store::{StateStore, StoreError};

const USER_COLUMNS: &str = r#"
    user_id, username, age, gender, preference, city, latitude, longitude,
    state, is_blocked, is_premium, premium_plan, premium_expires_at,
    free_matches_used, search_start_time, created_at, updated_at
"#;

const MATCH_COLUMNS: &str = "match_id, user1_id, user2_id, created_at, ended_at, ended_by";

/// PostgreSQL-backed state store
///
/// Pairing atomicity comes from two places: `commit_pairing` locks both
/// user rows (in id order) and re-checks `SEARCHING` inside one
/// transaction, and a partial unique index over the unordered pair of every
/// open match turns a duplicate insert into a no-op.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string and run migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL at {}", redact_url(url));

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }
}

/// Hide credentials before a URL reaches the logs
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let state: String = row.try_get("state")?;
    let state = state.parse::<UserState>().map_err(StoreError::InvalidData)?;

    let gender = parse_gender(row.try_get("gender")?)?;
    let preference = parse_gender(row.try_get("preference")?)?;

    let age: Option<i32> = row.try_get("age")?;
    let age = age
        .map(u8::try_from)
        .transpose()
        .map_err(|e| StoreError::InvalidData(format!("age out of range: {}", e)))?;

    let free_matches_used: i32 = row.try_get("free_matches_used")?;

    Ok(User {
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        age,
        gender,
        preference,
        city: row.try_get("city")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        state,
        is_blocked: row.try_get("is_blocked")?,
        is_premium: row.try_get("is_premium")?,
        premium_plan: row.try_get("premium_plan")?,
        premium_expires_at: row.try_get("premium_expires_at")?,
        free_matches_used: free_matches_used.max(0) as u32,
        search_start_time: row.try_get("search_start_time")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_gender(value: Option<String>) -> Result<Option<Gender>, StoreError> {
    value
        .map(|g| g.parse::<Gender>().map_err(StoreError::InvalidData))
        .transpose()
}

fn match_from_row(row: &PgRow) -> Result<Match, StoreError> {
    Ok(Match {
        match_id: row.try_get("match_id")?,
        user1_id: row.try_get("user1_id")?,
        user2_id: row.try_get("user2_id")?,
        created_at: row.try_get("created_at")?,
        ended_at: row.try_get("ended_at")?,
        ended_by: row.try_get("ended_by")?,
    })
}

fn state_names(states: &[UserState]) -> Vec<String> {
    states.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl StateStore for PostgresStore {
    async fn create_user(&self, user_id: UserId, username: Option<&str>) -> Result<User, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, state)
            VALUES ($1, $2, 'NEW')
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(username)
        .execute(&self.pool)
        .await?;

        self.get_user(user_id)
            .await?
            .ok_or_else(|| StoreError::InvalidData(format!("user {} vanished after insert", user_id)))
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn update_profile(&self, user_id: UserId, profile: &ProfileUpdate) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET age = $2, gender = $3, preference = $4, city = $5,
                latitude = $6, longitude = $7, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(i32::from(profile.age))
        .bind(profile.gender.as_str())
        .bind(profile.preference.as_str())
        .bind(profile.city.as_deref())
        .bind(profile.latitude)
        .bind(profile.longitude)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_state_if(&self, user_id: UserId, from: &[UserState], to: UserState) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET state = $2,
                search_start_time = CASE WHEN $2 = 'SEARCHING' THEN NOW() ELSE NULL END,
                updated_at = NOW()
            WHERE user_id = $1 AND state = ANY($3)
            "#,
        )
        .bind(user_id)
        .bind(to.as_str())
        .bind(state_names(from))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_blocked = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(blocked)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_searching_users(&self) -> Result<Vec<User>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM users
            WHERE state = 'SEARCHING' AND is_blocked = FALSE
            ORDER BY search_start_time ASC NULLS LAST, user_id ASC
            "#,
            USER_COLUMNS
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn grant_premium(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_premium = TRUE, premium_plan = $2, premium_expires_at = $3, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(plan)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn downgrade_premium(&self, user_id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_premium = FALSE, premium_plan = NULL, premium_expires_at = NULL, updated_at = NOW()
            WHERE user_id = $1 AND (is_premium OR premium_expires_at IS NOT NULL)
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_free_matches(&self, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET free_matches_used = free_matches_used + 1 WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_match_if_absent(&self, user_a: UserId, user_b: UserId) -> Result<Option<MatchId>, StoreError> {
        if user_a == user_b {
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        // Serialise on the user rows; the unique index only covers the pair itself
        let locked = sqlx::query("SELECT user_id FROM users WHERE user_id = ANY($1) ORDER BY user_id FOR UPDATE")
            .bind(vec![user_a, user_b])
            .fetch_all(&mut *tx)
            .await?;

        if locked.len() != 2 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO matches (user1_id, user2_id)
            SELECT $1, $2
            WHERE NOT EXISTS (
                SELECT 1 FROM matches
                WHERE ended_at IS NULL
                  AND (user1_id IN ($1, $2) OR user2_id IN ($1, $2))
            )
            ON CONFLICT DO NOTHING
            RETURNING match_id
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&mut *tx)
        .await?;

        let match_id = row.map(|r| r.try_get("match_id")).transpose()?;
        tx.commit().await?;

        Ok(match_id)
    }

    async fn commit_pairing(&self, commit: &PairingCommit) -> Result<Option<Match>, StoreError> {
        if commit.user_a == commit.user_b {
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        // Lock both rows in a stable order so concurrent commits cannot deadlock
        let locked = sqlx::query(
            r#"
            SELECT user_id FROM users
            WHERE user_id = ANY($1) AND state = 'SEARCHING' AND is_blocked = FALSE
            ORDER BY user_id
            FOR UPDATE
            "#,
        )
        .bind(vec![commit.user_a, commit.user_b])
        .fetch_all(&mut *tx)
        .await?;

        if locked.len() != 2 {
            tx.rollback().await?;
            return Ok(None);
        }

        let query = format!(
            r#"
            INSERT INTO matches (user1_id, user2_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            MATCH_COLUMNS
        );
        let inserted = sqlx::query(&query)
            .bind(commit.user_a)
            .bind(commit.user_b)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };
        let record = match_from_row(&row)?;

        let charged = commit.charged_users();
        if !charged.is_empty() {
            sqlx::query("UPDATE users SET free_matches_used = free_matches_used + 1 WHERE user_id = ANY($1)")
                .bind(charged)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            UPDATE users
            SET state = 'CHATTING', search_start_time = NULL, updated_at = NOW()
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(vec![commit.user_a, commit.user_b])
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(record))
    }

    async fn get_open_match(&self, user_id: UserId) -> Result<Option<Match>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM matches
            WHERE (user1_id = $1 OR user2_id = $1) AND ended_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            MATCH_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    async fn end_match(&self, match_id: MatchId, ended_by: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE matches SET ended_at = NOW(), ended_by = $2
            WHERE match_id = $1 AND ended_at IS NULL
            "#,
        )
        .bind(match_id)
        .bind(ended_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn other_participant(&self, match_id: MatchId, user_id: UserId) -> Result<Option<UserId>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT CASE WHEN user1_id = $2 THEN user2_id ELSE user1_id END AS other_user_id
            FROM matches
            WHERE match_id = $1 AND (user1_id = $2 OR user2_id = $2)
            "#,
        )
        .bind(match_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get("other_user_id")).transpose().map_err(Into::into)
    }

    async fn excluded_partners(
        &self,
        user_id: UserId,
        include_past_partners: bool,
    ) -> Result<HashSet<UserId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT blocked_id AS other_id FROM blocked_pairs WHERE blocker_id = $1
            UNION
            SELECT blocker_id FROM blocked_pairs WHERE blocked_id = $1
            UNION
            SELECT user2_id FROM matches WHERE user1_id = $1 AND ($2 OR ended_at IS NULL)
            UNION
            SELECT user1_id FROM matches WHERE user2_id = $1 AND ($2 OR ended_at IS NULL)
            "#,
        )
        .bind(user_id)
        .bind(include_past_partners)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("other_id").map_err(Into::into))
            .collect()
    }

    async fn blocked_pairs_among(&self, user_ids: &[UserId]) -> Result<HashSet<(UserId, UserId)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT blocker_id, blocked_id
            FROM blocked_pairs
            WHERE blocker_id = ANY($1) AND blocked_id = ANY($1)
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let blocker: i64 = row.try_get("blocker_id")?;
                let blocked: i64 = row.try_get("blocked_id")?;
                Ok(pair_key(blocker, blocked))
            })
            .collect()
    }

    async fn block(&self, blocker_id: UserId, blocked_id: UserId, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO blocked_pairs (blocker_id, blocked_id, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (blocker_id, blocked_id) DO NOTHING
            "#,
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Recorded block: {} -> {}", blocker_id, blocked_id);
        Ok(())
    }

    async fn report(&self, reporter_id: UserId, reported_id: UserId, reason: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO reports (reporter_id, reported_id, reason) VALUES ($1, $2, $3)")
            .bind(reporter_id)
            .bind(reported_id)
            .bind(reason)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}
