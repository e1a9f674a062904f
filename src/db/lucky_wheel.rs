//! Queries for the lucky-wheel tables and the spin transaction.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::coupons::{self, CouponRow, CouponValues};
use super::PageRequest;
use crate::domain::coupon::DiscountType;
use crate::domain::events::{DomainEvent, LuckyWheelEvent};
use crate::domain::lucky_wheel::{
    check_eligibility, coupon_code, pick_prize, PrizeCandidate, PrizeType, SpinHistory, WheelError,
    WheelRules,
};
use crate::error::{Result, StoreError};

const CONFIG_COLUMNS: &str = "id, name, is_active, starts_at, ends_at, cooldown_hours, max_spins_per_user, \
     max_spins_per_fingerprint, require_login, coupon_valid_days, created_at, updated_at";

const PRIZE_COLUMNS: &str =
    "id, config_id, label, prize_type, value, probability, stock, color, position, is_active, created_at, updated_at";

const SPIN_COLUMNS: &str = "id, config_id, prize_id, prize_label, customer_id, fingerprint, coupon_code, created_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WheelConfigRow {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub cooldown_hours: i32,
    pub max_spins_per_user: i32,
    pub max_spins_per_fingerprint: i32,
    pub require_login: bool,
    pub coupon_valid_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WheelConfigRow {
    pub fn rules(&self) -> WheelRules {
        WheelRules {
            is_active: self.is_active,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            cooldown_hours: self.cooldown_hours,
            max_spins_per_user: self.max_spins_per_user,
            max_spins_per_fingerprint: self.max_spins_per_fingerprint,
            require_login: self.require_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PrizeRow {
    pub id: Uuid,
    pub config_id: Uuid,
    pub label: String,
    pub prize_type: String,
    pub value: i64,
    pub probability: f64,
    pub stock: Option<i32>,
    pub color: Option<String>,
    pub position: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrizeRow {
    fn candidate(&self) -> PrizeCandidate {
        PrizeCandidate {
            id: self.id,
            probability: self.probability,
            stock: self.stock,
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SpinRow {
    pub id: Uuid,
    pub config_id: Uuid,
    pub prize_id: Option<Uuid>,
    pub prize_label: String,
    pub customer_id: Option<Uuid>,
    pub fingerprint: String,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConfigValues {
    pub name: String,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub cooldown_hours: i32,
    pub max_spins_per_user: i32,
    pub max_spins_per_fingerprint: i32,
    pub require_login: bool,
    pub coupon_valid_days: i32,
}

#[derive(Debug, Clone)]
pub struct PrizeValues {
    pub label: String,
    pub prize_type: PrizeType,
    pub value: i64,
    pub probability: f64,
    pub stock: Option<i32>,
    pub color: Option<String>,
    pub position: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct SpinOutcome {
    pub spin: SpinRow,
    pub prize: PrizeRow,
    pub coupon: Option<CouponRow>,
}

// ---------------------------------------------------------------------------
// Configs
// ---------------------------------------------------------------------------

pub async fn list_configs(pool: &PgPool) -> Result<Vec<WheelConfigRow>> {
    let rows = sqlx::query_as::<_, WheelConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM lucky_wheel_configs ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_config(pool: &PgPool, id: Uuid) -> Result<Option<WheelConfigRow>> {
    let row = sqlx::query_as::<_, WheelConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM lucky_wheel_configs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The wheel shown on the storefront: the most recently updated active one.
pub async fn active_config(pool: &PgPool) -> Result<Option<WheelConfigRow>> {
    let row = sqlx::query_as::<_, WheelConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM lucky_wheel_configs WHERE is_active \
         ORDER BY updated_at DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn insert_config(pool: &PgPool, values: &ConfigValues) -> Result<WheelConfigRow> {
    sqlx::query_as::<_, WheelConfigRow>(&format!(
        "INSERT INTO lucky_wheel_configs (id, name, is_active, starts_at, ends_at, cooldown_hours, \
                max_spins_per_user, max_spins_per_fingerprint, require_login, coupon_valid_days) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {CONFIG_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(&values.name)
    .bind(values.is_active)
    .bind(values.starts_at)
    .bind(values.ends_at)
    .bind(values.cooldown_hours)
    .bind(values.max_spins_per_user)
    .bind(values.max_spins_per_fingerprint)
    .bind(values.require_login)
    .bind(values.coupon_valid_days)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "lucky wheel"))
}

pub async fn update_config(pool: &PgPool, id: Uuid, values: &ConfigValues) -> Result<Option<WheelConfigRow>> {
    let row = sqlx::query_as::<_, WheelConfigRow>(&format!(
        "UPDATE lucky_wheel_configs SET name = $2, is_active = $3, starts_at = $4, ends_at = $5, \
                cooldown_hours = $6, max_spins_per_user = $7, max_spins_per_fingerprint = $8, \
                require_login = $9, coupon_valid_days = $10, updated_at = NOW() \
         WHERE id = $1 RETURNING {CONFIG_COLUMNS}"
    ))
    .bind(id)
    .bind(&values.name)
    .bind(values.is_active)
    .bind(values.starts_at)
    .bind(values.ends_at)
    .bind(values.cooldown_hours)
    .bind(values.max_spins_per_user)
    .bind(values.max_spins_per_fingerprint)
    .bind(values.require_login)
    .bind(values.coupon_valid_days)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "lucky wheel"))?;
    Ok(row)
}

pub async fn delete_config(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM lucky_wheel_configs WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Prizes
// ---------------------------------------------------------------------------

pub async fn list_prizes(pool: &PgPool, config_id: Uuid) -> Result<Vec<PrizeRow>> {
    let rows = sqlx::query_as::<_, PrizeRow>(&format!(
        "SELECT {PRIZE_COLUMNS} FROM lucky_wheel_prizes WHERE config_id = $1 ORDER BY position, created_at"
    ))
    .bind(config_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn insert_prize(pool: &PgPool, config_id: Uuid, values: &PrizeValues) -> Result<PrizeRow> {
    sqlx::query_as::<_, PrizeRow>(&format!(
        "INSERT INTO lucky_wheel_prizes (id, config_id, label, prize_type, value, probability, stock, \
                color, position, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {PRIZE_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(config_id)
    .bind(&values.label)
    .bind(values.prize_type.as_str())
    .bind(values.value)
    .bind(values.probability)
    .bind(values.stock)
    .bind(values.color.as_deref())
    .bind(values.position)
    .bind(values.is_active)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "prize"))
}

pub async fn update_prize(pool: &PgPool, id: Uuid, values: &PrizeValues) -> Result<Option<PrizeRow>> {
    let row = sqlx::query_as::<_, PrizeRow>(&format!(
        "UPDATE lucky_wheel_prizes SET label = $2, prize_type = $3, value = $4, probability = $5, \
                stock = $6, color = $7, position = $8, is_active = $9, updated_at = NOW() \
         WHERE id = $1 RETURNING {PRIZE_COLUMNS}"
    ))
    .bind(id)
    .bind(&values.label)
    .bind(values.prize_type.as_str())
    .bind(values.value)
    .bind(values.probability)
    .bind(values.stock)
    .bind(values.color.as_deref())
    .bind(values.position)
    .bind(values.is_active)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::from_db(e, "prize"))?;
    Ok(row)
}

pub async fn delete_prize(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM lucky_wheel_prizes WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Spins
// ---------------------------------------------------------------------------

pub async fn list_spins(
    pool: &PgPool,
    config_id: Option<Uuid>,
    page: PageRequest,
) -> Result<(Vec<SpinRow>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM lucky_wheel_spins WHERE ($1::UUID IS NULL OR config_id = $1)",
    )
    .bind(config_id)
    .fetch_one(pool)
    .await?;
    let rows = sqlx::query_as::<_, SpinRow>(&format!(
        "SELECT {SPIN_COLUMNS} FROM lucky_wheel_spins WHERE ($1::UUID IS NULL OR config_id = $1) \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(config_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;
    Ok((rows, total))
}

async fn spin_history(
    conn: &mut PgConnection,
    config_id: Uuid,
    customer_id: Option<Uuid>,
    fingerprint: &str,
) -> Result<SpinHistory> {
    let (user_spins, user_last_spin) = match customer_id {
        Some(customer_id) => {
            sqlx::query_as::<_, (i64, Option<DateTime<Utc>>)>(
                "SELECT COUNT(*), MAX(created_at) FROM lucky_wheel_spins \
                 WHERE config_id = $1 AND customer_id = $2",
            )
            .bind(config_id)
            .bind(customer_id)
            .fetch_one(&mut *conn)
            .await?
        }
        None => (0, None),
    };
    let (fingerprint_spins, fingerprint_last_spin) = sqlx::query_as::<_, (i64, Option<DateTime<Utc>>)>(
        "SELECT COUNT(*), MAX(created_at) FROM lucky_wheel_spins WHERE config_id = $1 AND fingerprint = $2",
    )
    .bind(config_id)
    .bind(fingerprint)
    .fetch_one(&mut *conn)
    .await?;

    Ok(SpinHistory { user_spins, user_last_spin, fingerprint_spins, fingerprint_last_spin })
}

/// Runs one spin of the wheel `config_id` inside a transaction.
///
const COUPON_CODE_ATTEMPTS: usize = 5;

/// Inserts the prize coupon under the first generated code that is free.
async fn mint_coupon(
    conn: &mut PgConnection,
    mut values: CouponValues,
    mut next_code: impl FnMut() -> String,
) -> Result<CouponRow> {
    for _ in 0..COUPON_CODE_ATTEMPTS {
        values.code = next_code();
        if let Some(row) = coupons::insert_unless_taken(&mut *conn, &values).await? {
            return Ok(row);
        }
        tracing::warn!(code = %values.code, "wheel coupon code taken, generating another");
    }
    Err(StoreError::conflict("could not allocate a coupon code"))
}

/// Spins from the same device on the same wheel are serialized with an
/// advisory lock so quota and cooldown checks see every earlier spin. Stock
/// is decremented conditionally; a prize that ran out since it was loaded is
/// dropped and the draw repeated.
pub async fn spin(
    pool: &PgPool,
    config_id: Uuid,
    customer_id: Option<Uuid>,
    fingerprint: &str,
) -> Result<(SpinOutcome, Vec<DomainEvent>)> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("{config_id}:{fingerprint}"))
        .execute(&mut *tx)
        .await?;

    let config = sqlx::query_as::<_, WheelConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM lucky_wheel_configs WHERE id = $1"
    ))
    .bind(config_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound("lucky wheel"))?;

    if let Some(customer_id) = customer_id {
        let known = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM customers WHERE id = $1)")
            .bind(customer_id)
            .fetch_one(&mut *tx)
            .await?;
        if !known {
            return Err(StoreError::NotFound("customer"));
        }
    }

    let now = Utc::now();
    let history = spin_history(&mut *tx, config_id, customer_id, fingerprint).await?;
    check_eligibility(&config.rules(), customer_id.is_some(), &history, now)?;

    let mut prizes = sqlx::query_as::<_, PrizeRow>(&format!(
        "SELECT {PRIZE_COLUMNS} FROM lucky_wheel_prizes WHERE config_id = $1 AND is_active \
         ORDER BY position, created_at"
    ))
    .bind(config_id)
    .fetch_all(&mut *tx)
    .await?;

    let prize = loop {
        let candidates: Vec<PrizeCandidate> = prizes.iter().map(PrizeRow::candidate).collect();
        let picked = pick_prize(&candidates, rand::random::<f64>())?;
        let index = prizes
            .iter()
            .position(|p| p.id == picked)
            .ok_or(WheelError::NoPrizesAvailable)?;
        if prizes[index].stock.is_none() {
            break prizes.swap_remove(index);
        }
        let remaining = sqlx::query_scalar::<_, i32>(
            "UPDATE lucky_wheel_prizes SET stock = stock - 1, updated_at = NOW() \
             WHERE id = $1 AND stock > 0 RETURNING stock",
        )
        .bind(picked)
        .fetch_optional(&mut *tx)
        .await?;
        let mut won = prizes.swap_remove(index);
        match remaining {
            Some(stock) => {
                won.stock = Some(stock);
                break won;
            }
            None => tracing::debug!(prize_id = %picked, "prize ran out during spin, drawing again"),
        }
    };

    let prize_type = PrizeType::parse(&prize.prize_type)?;
    let coupon = match prize_type.coupon_discount_type() {
        Some(discount_type) => {
            let values = CouponValues {
                code: String::new(),
                discount_type: DiscountType::parse(discount_type)?,
                value: prize.value,
                min_order_amount: 0,
                usage_limit: Some(1),
                starts_at: Some(now),
                expires_at: Some(now + Duration::days(i64::from(config.coupon_valid_days))),
                is_active: true,
            };
            Some(mint_coupon(&mut *tx, values, coupon_code).await?)
        }
        None => None,
    };

    let spin = sqlx::query_as::<_, SpinRow>(&format!(
        "INSERT INTO lucky_wheel_spins (id, config_id, prize_id, prize_label, customer_id, fingerprint, coupon_code) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {SPIN_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(config_id)
    .bind(prize.id)
    .bind(&prize.label)
    .bind(customer_id)
    .bind(fingerprint)
    .bind(coupon.as_ref().map(|c| c.code.as_str()))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(spin_id = %spin.id, prize = %prize.label, "lucky wheel spun");

    let event = DomainEvent::LuckyWheel(LuckyWheelEvent::Spun {
        spin_id: spin.id,
        config_id,
        prize_label: prize.label.clone(),
        coupon_code: spin.coupon_code.clone(),
    });
    Ok((SpinOutcome { spin, prize, coupon }, vec![event]))
}
