//! PostgreSQL implementation of SubscriptionStore.
//!
//! Row locks are taken with `SELECT ... FOR UPDATE`. A buyer without a
//! membership row has nothing to lock, so `lock_membership` first takes a
//! transaction-scoped advisory lock keyed on the buyer; concurrent first
//! purchases by one buyer serialize on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::foundation::{
    DateWindow, DomainError, ErrorCode, InvoiceId, MembershipId, OfferId, OrderId, PriceId,
    SnapshotId, Timestamp, UserId, YearMonthDay,
};
use crate::domain::membership::{
    AddOnBalance, AddOnSource, Cycle, Edition, Invoice, Membership, MembershipSnapshot, Order,
    OrderKind, PaymentMethod, SnapshotReason, Tier,
};
use crate::ports::{SubscriptionStore, SubscriptionTransaction};

const MEMBERSHIP_COLUMNS: &str = "id, user_id, tier, cycle, expires_at, payment_method, \
     auto_renewal, stripe_subscription_id, apple_subscription_id, b2b_licence_id, \
     add_on_standard, add_on_premium, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, user_id, tier, cycle, kind, price_id, offer_id, list_amount, \
     charged_amount, currency, period_years, period_months, period_days, payment_method, \
     provider_subscription_id, created_at, confirmed_at, window_start, window_end";

const INVOICE_COLUMNS: &str = "id, user_id, order_id, tier, cycle, period_years, period_months, \
     period_days, order_kind, add_on_source, payment_method, provider_subscription_id, \
     paid_amount, currency, window_start, window_end, consumed_at, carried_over_at, created_at";

/// PostgreSQL implementation of the SubscriptionStore port.
#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Rows
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    id: Uuid,
    user_id: String,
    tier: String,
    cycle: String,
    expires_at: DateTime<Utc>,
    payment_method: Option<String>,
    auto_renewal: bool,
    stripe_subscription_id: Option<String>,
    apple_subscription_id: Option<String>,
    b2b_licence_id: Option<String>,
    add_on_standard: i64,
    add_on_premium: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = DomainError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            id: MembershipId::from_uuid(row.id),
            user_id: parse_user_id(row.user_id)?,
            edition: parse_edition(&row.tier, &row.cycle)?,
            expires_at: Timestamp::from_datetime(row.expires_at),
            payment_method: row
                .payment_method
                .as_deref()
                .map(parse_payment_method)
                .transpose()?,
            auto_renewal: row.auto_renewal,
            stripe_subscription_id: row.stripe_subscription_id,
            apple_subscription_id: row.apple_subscription_id,
            b2b_licence_id: row.b2b_licence_id,
            add_on: AddOnBalance {
                standard: row.add_on_standard,
                premium: row.add_on_premium,
            },
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    tier: String,
    cycle: String,
    kind: String,
    price_id: String,
    offer_id: Option<String>,
    list_amount: i64,
    charged_amount: i64,
    currency: String,
    period_years: i32,
    period_months: i32,
    period_days: i32,
    payment_method: String,
    provider_subscription_id: Option<String>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: OrderId::from_uuid(row.id),
            user_id: parse_user_id(row.user_id)?,
            edition: parse_edition(&row.tier, &row.cycle)?,
            kind: parse_order_kind(&row.kind)?,
            price_id: PriceId::new(row.price_id).map_err(corrupt)?,
            offer_id: row.offer_id.map(OfferId::new).transpose().map_err(corrupt)?,
            list_amount: row.list_amount,
            charged_amount: row.charged_amount,
            currency: row.currency,
            period: period_from_row(row.period_years, row.period_months, row.period_days)?,
            payment_method: parse_payment_method(&row.payment_method)?,
            provider_subscription_id: row.provider_subscription_id,
            created_at: Timestamp::from_datetime(row.created_at),
            confirmed_at: row.confirmed_at.map(Timestamp::from_datetime),
            window: window_from_row(row.window_start, row.window_end),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    user_id: String,
    order_id: Option<Uuid>,
    tier: String,
    cycle: String,
    period_years: i32,
    period_months: i32,
    period_days: i32,
    order_kind: String,
    add_on_source: Option<String>,
    payment_method: Option<String>,
    provider_subscription_id: Option<String>,
    paid_amount: i64,
    currency: String,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
    consumed_at: Option<DateTime<Utc>>,
    carried_over_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let add_on_source = match row.add_on_source.as_deref() {
            Some(s) => Some(AddOnSource::parse(s).ok_or_else(|| {
                DomainError::database(format!("Invalid add_on_source value: {}", s))
            })?),
            None => None,
        };

        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            user_id: parse_user_id(row.user_id)?,
            order_id: row.order_id.map(OrderId::from_uuid),
            edition: parse_edition(&row.tier, &row.cycle)?,
            period: period_from_row(row.period_years, row.period_months, row.period_days)?,
            order_kind: parse_order_kind(&row.order_kind)?,
            add_on_source,
            payment_method: row
                .payment_method
                .as_deref()
                .map(parse_payment_method)
                .transpose()?,
            provider_subscription_id: row.provider_subscription_id,
            paid_amount: row.paid_amount,
            currency: row.currency,
            window: window_from_row(row.window_start, row.window_end),
            consumed_at: row.consumed_at.map(Timestamp::from_datetime),
            carried_over_at: row.carried_over_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    membership: serde_json::Value,
    reason: String,
    order_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for MembershipSnapshot {
    type Error = DomainError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let membership: Membership = serde_json::from_value(row.membership).map_err(|e| {
            DomainError::database(format!("Invalid snapshot payload: {}", e))
        })?;
        let reason = match row.reason.as_str() {
            "add_on_claim" => SnapshotReason::AddOnClaim,
            other => SnapshotReason::Order(parse_order_kind(other)?),
        };

        Ok(MembershipSnapshot {
            id: SnapshotId::from_uuid(row.id),
            membership,
            reason,
            order_id: row.order_id.map(OrderId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Store
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn begin(&self) -> Result<Box<dyn SubscriptionTransaction>, DomainError> {
        let tx = self.pool.begin().await.map_err(|e| {
            DomainError::database(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(Box::new(PostgresSubscriptionTransaction { tx }))
    }

    async fn find_membership(&self, user_id: &UserId) -> Result<Option<Membership>, DomainError> {
        let row: Option<MembershipRow> = sqlx::query_as(&format!(
            "SELECT {} FROM memberships WHERE user_id = $1",
            MEMBERSHIP_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find membership: {}", e)))?;

        row.map(Membership::try_from).transpose()
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to find order: {}", e)))?;

        row.map(Order::try_from).transpose()
    }

    async fn save_order(&self, order: &Order) -> Result<(), DomainError> {
        let (years, months, days) = period_to_row(&order.period)?;
        let (window_start, window_end) = window_to_row(order.window);

        sqlx::query(&format!(
            "INSERT INTO orders ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
            ORDER_COLUMNS
        ))
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_str())
        .bind(order.edition.tier.as_str())
        .bind(order.edition.cycle.as_str())
        .bind(order.kind.as_str())
        .bind(order.price_id.as_str())
        .bind(order.offer_id.as_ref().map(|o| o.as_str()))
        .bind(order.list_amount)
        .bind(order.charged_amount)
        .bind(&order.currency)
        .bind(years)
        .bind(months)
        .bind(days)
        .bind(order.payment_method.as_str())
        .bind(order.provider_subscription_id.as_deref())
        .bind(order.created_at.as_datetime())
        .bind(order.confirmed_at.map(|t| *t.as_datetime()))
        .bind(window_start)
        .bind(window_end)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("orders_pkey") {
                    return DomainError::new(
                        ErrorCode::ValidationFailed,
                        format!("Order already exists: {}", order.id),
                    );
                }
            }
            DomainError::database(format!("Failed to save order: {}", e))
        })?;

        Ok(())
    }

    async fn list_invoices(&self, user_id: &UserId) -> Result<Vec<Invoice>, DomainError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM invoices WHERE user_id = $1 ORDER BY created_at ASC",
            INVOICE_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list invoices: {}", e)))?;

        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn list_snapshots(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<MembershipSnapshot>, DomainError> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT id, membership, reason, order_id, created_at
            FROM membership_snapshots
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list snapshots: {}", e)))?;

        rows.into_iter().map(MembershipSnapshot::try_from).collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Transaction
// ════════════════════════════════════════════════════════════════════════════════

/// Open sqlx transaction. Dropping it without commit rolls back.
pub struct PostgresSubscriptionTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SubscriptionTransaction for PostgresSubscriptionTransaction {
    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(lock_failed("order"))?;

        row.map(Order::try_from).transpose()
    }

    async fn lock_membership(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, DomainError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(user_id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(lock_failed("buyer"))?;

        let row: Option<MembershipRow> = sqlx::query_as(&format!(
            "SELECT {} FROM memberships WHERE user_id = $1 FOR UPDATE",
            MEMBERSHIP_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(lock_failed("membership"))?;

        row.map(Membership::try_from).transpose()
    }

    async fn list_invoices(&mut self, user_id: &UserId) -> Result<Vec<Invoice>, DomainError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM invoices WHERE user_id = $1 ORDER BY created_at ASC",
            INVOICE_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list invoices: {}", e)))?;

        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        let (window_start, window_end) = window_to_row(order.window);

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                kind = $2,
                confirmed_at = $3,
                window_start = $4,
                window_end = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.kind.as_str())
        .bind(order.confirmed_at.map(|t| *t.as_datetime()))
        .bind(window_start)
        .bind(window_end)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update order: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::OrderNotFound,
                format!("Order not found: {}", order.id),
            ));
        }
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError> {
        let (years, months, days) = period_to_row(&invoice.period)?;
        let (window_start, window_end) = window_to_row(invoice.window);

        sqlx::query(&format!(
            "INSERT INTO invoices ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
            INVOICE_COLUMNS
        ))
        .bind(invoice.id.as_uuid())
        .bind(invoice.user_id.as_str())
        .bind(invoice.order_id.map(|id| *id.as_uuid()))
        .bind(invoice.edition.tier.as_str())
        .bind(invoice.edition.cycle.as_str())
        .bind(years)
        .bind(months)
        .bind(days)
        .bind(invoice.order_kind.as_str())
        .bind(invoice.add_on_source.map(|s| s.as_str()))
        .bind(invoice.payment_method.map(|m| m.as_str()))
        .bind(invoice.provider_subscription_id.as_deref())
        .bind(invoice.paid_amount)
        .bind(&invoice.currency)
        .bind(window_start)
        .bind(window_end)
        .bind(invoice.consumed_at.map(|t| *t.as_datetime()))
        .bind(invoice.carried_over_at.map(|t| *t.as_datetime()))
        .bind(invoice.created_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert invoice: {}", e)))?;

        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), DomainError> {
        let (window_start, window_end) = window_to_row(invoice.window);

        // A set window never changes.
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                window_start = $2,
                window_end = $3,
                consumed_at = $4
            WHERE id = $1 AND window_start IS NULL
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(window_start)
        .bind(window_end)
        .bind(invoice.consumed_at.map(|t| *t.as_datetime()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update invoice: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::InvoiceNotFound,
                format!("No windowless invoice {}", invoice.id),
            ));
        }
        Ok(())
    }

    async fn stamp_carried_over(
        &mut self,
        ids: &[InvoiceId],
        at: Timestamp,
    ) -> Result<(), DomainError> {
        if ids.is_empty() {
            return Ok(());
        }
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        sqlx::query(
            r#"
            UPDATE invoices SET carried_over_at = $2
            WHERE id = ANY($1) AND carried_over_at IS NULL
            "#,
        )
        .bind(&uuids)
        .bind(at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to stamp invoices: {}", e)))?;

        Ok(())
    }

    async fn save_membership(&mut self, membership: &Membership) -> Result<(), DomainError> {
        sqlx::query(&format!(
            "INSERT INTO memberships ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (user_id) DO UPDATE SET \
                tier = EXCLUDED.tier, \
                cycle = EXCLUDED.cycle, \
                expires_at = EXCLUDED.expires_at, \
                payment_method = EXCLUDED.payment_method, \
                auto_renewal = EXCLUDED.auto_renewal, \
                stripe_subscription_id = EXCLUDED.stripe_subscription_id, \
                apple_subscription_id = EXCLUDED.apple_subscription_id, \
                b2b_licence_id = EXCLUDED.b2b_licence_id, \
                add_on_standard = EXCLUDED.add_on_standard, \
                add_on_premium = EXCLUDED.add_on_premium, \
                updated_at = EXCLUDED.updated_at",
            MEMBERSHIP_COLUMNS
        ))
        .bind(membership.id.as_uuid())
        .bind(membership.user_id.as_str())
        .bind(membership.edition.tier.as_str())
        .bind(membership.edition.cycle.as_str())
        .bind(membership.expires_at.as_datetime())
        .bind(membership.payment_method.map(|m| m.as_str()))
        .bind(membership.auto_renewal)
        .bind(&membership.stripe_subscription_id)
        .bind(&membership.apple_subscription_id)
        .bind(&membership.b2b_licence_id)
        .bind(membership.add_on.standard)
        .bind(membership.add_on.premium)
        .bind(membership.created_at.as_datetime())
        .bind(membership.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to save membership: {}", e)))?;

        Ok(())
    }

    async fn archive_membership(
        &mut self,
        snapshot: &MembershipSnapshot,
    ) -> Result<(), DomainError> {
        let payload = serde_json::to_value(&snapshot.membership).map_err(|e| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("Failed to serialize snapshot: {}", e),
            )
        })?;

        sqlx::query(
            r#"
            INSERT INTO membership_snapshots (id, user_id, membership, reason, order_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(snapshot.membership.user_id.as_str())
        .bind(payload)
        .bind(snapshot.reason.as_str())
        .bind(snapshot.order_id.map(|id| *id.as_uuid()))
        .bind(snapshot.created_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to archive membership: {}", e)))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(|e| {
            DomainError::database(format!("Failed to commit transaction: {}", e))
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(|e| {
            DomainError::database(format!("Failed to roll back transaction: {}", e))
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Helper Functions
// ════════════════════════════════════════════════════════════════════════════════

fn corrupt(err: impl std::fmt::Display) -> DomainError {
    DomainError::database(format!("Invalid stored value: {}", err))
}

fn lock_failed(what: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::LockFailed, format!("Failed to lock {}: {}", what, e))
}

fn parse_user_id(raw: String) -> Result<UserId, DomainError> {
    UserId::new(raw).map_err(corrupt)
}

fn parse_edition(tier: &str, cycle: &str) -> Result<Edition, DomainError> {
    let tier = Tier::parse(tier)
        .ok_or_else(|| DomainError::database(format!("Invalid tier value: {}", tier)))?;
    let cycle = Cycle::parse(cycle)
        .ok_or_else(|| DomainError::database(format!("Invalid cycle value: {}", cycle)))?;
    Ok(Edition::new(tier, cycle))
}

fn parse_order_kind(s: &str) -> Result<OrderKind, DomainError> {
    OrderKind::parse(s)
        .ok_or_else(|| DomainError::database(format!("Invalid order kind value: {}", s)))
}

fn parse_payment_method(s: &str) -> Result<PaymentMethod, DomainError> {
    PaymentMethod::parse(s)
        .ok_or_else(|| DomainError::database(format!("Invalid payment method value: {}", s)))
}

fn period_to_row(period: &YearMonthDay) -> Result<(i32, i32, i32), DomainError> {
    let to_i32 = |v: u32| {
        i32::try_from(v).map_err(|_| {
            DomainError::new(ErrorCode::OutOfRange, format!("Period {} out of range", period))
        })
    };
    Ok((
        to_i32(period.years)?,
        to_i32(period.months)?,
        to_i32(period.days)?,
    ))
}

fn period_from_row(years: i32, months: i32, days: i32) -> Result<YearMonthDay, DomainError> {
    let to_u32 = |v: i32| u32::try_from(v).map_err(corrupt);
    Ok(YearMonthDay::new(to_u32(years)?, to_u32(months)?, to_u32(days)?))
}

fn window_to_row(window: Option<DateWindow>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match window {
        Some(w) => (Some(*w.start.as_datetime()), Some(*w.end.as_datetime())),
        None => (None, None),
    }
}

fn window_from_row(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<DateWindow> {
    match (start, end) {
        (Some(start), Some(end)) => Some(DateWindow {
            start: Timestamp::from_datetime(start),
            end: Timestamp::from_datetime(end),
        }),
        _ => None,
    }
}
