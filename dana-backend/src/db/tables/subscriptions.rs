//! Subscription tier, user subscription, invoice and payment database operations

use chrono::{DateTime, Months, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::sqlite::{enum_col, json_col};
use crate::models::{
    BillingCycle, CreatePaymentRequest, CreateTierRequest, Invoice, InvoiceStatus, Payment,
    SubscriptionTier, UpdateTierRequest, UserSubscription,
};
use super::super::Database;

const TIER_COLUMNS: &str =
    "id, name, description, monthly_price_cents, annual_price_cents, features, is_active, created_at, updated_at";

const SUBSCRIPTION_SELECT: &str =
    "SELECT s.id, s.user_id, s.tier_id, t.name, s.billing_cycle, s.status, s.current_period_start,
            s.current_period_end, s.cancelled_at, s.created_at
     FROM user_subscriptions s JOIN subscription_tiers t ON t.id = s.tier_id";

const INVOICE_COLUMNS: &str = "id, user_id, subscription_id, amount_cents, currency, status, issued_at, paid_at";

const PAYMENT_COLUMNS: &str = "id, user_id, invoice_id, amount_cents, method, reference, created_at";

/// End of the billing period that starts at `start`
pub(crate) fn period_end(start: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    let months = match cycle {
        BillingCycle::Monthly => 1,
        BillingCycle::Annual => 12,
    };
    start.checked_add_months(Months::new(months)).unwrap_or(start)
}

impl Database {
    fn row_to_tier(row: &Row) -> SqliteResult<SubscriptionTier> {
        Ok(SubscriptionTier {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            monthly_price_cents: row.get(3)?,
            annual_price_cents: row.get(4)?,
            features: json_col(row, 5)?,
            is_active: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn row_to_subscription(row: &Row) -> SqliteResult<UserSubscription> {
        Ok(UserSubscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            tier_id: row.get(2)?,
            tier_name: row.get(3)?,
            billing_cycle: enum_col(row, 4)?,
            status: enum_col(row, 5)?,
            current_period_start: row.get(6)?,
            current_period_end: row.get(7)?,
            cancelled_at: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn row_to_invoice(row: &Row) -> SqliteResult<Invoice> {
        Ok(Invoice {
            id: row.get(0)?,
            user_id: row.get(1)?,
            subscription_id: row.get(2)?,
            amount_cents: row.get(3)?,
            currency: row.get(4)?,
            status: enum_col(row, 5)?,
            issued_at: row.get(6)?,
            paid_at: row.get(7)?,
        })
    }

    fn row_to_payment(row: &Row) -> SqliteResult<Payment> {
        Ok(Payment {
            id: row.get(0)?,
            user_id: row.get(1)?,
            invoice_id: row.get(2)?,
            amount_cents: row.get(3)?,
            method: row.get(4)?,
            reference: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn list_tiers(&self, active_only: bool) -> SqliteResult<Vec<SubscriptionTier>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscription_tiers WHERE (?1 = 0 OR is_active = 1) ORDER BY monthly_price_cents, id",
            TIER_COLUMNS
        ))?;
        let tiers = stmt
            .query_map([active_only as i64], Self::row_to_tier)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(tiers)
    }

    pub fn get_tier(&self, id: i64) -> SqliteResult<Option<SubscriptionTier>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM subscription_tiers WHERE id = ?1", TIER_COLUMNS),
            [id],
            Self::row_to_tier,
        )
        .optional()
    }

    #[cfg(test)]
    pub fn get_tier_by_name(&self, name: &str) -> SqliteResult<Option<SubscriptionTier>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM subscription_tiers WHERE name = ?1", TIER_COLUMNS),
            [name],
            Self::row_to_tier,
        )
        .optional()
    }

    pub fn create_tier(&self, req: &CreateTierRequest) -> SqliteResult<SubscriptionTier> {
        let id = {
            let conn = self.conn.lock();
            let now = Utc::now().to_rfc3339();
            let features = serde_json::to_string(&req.features).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "INSERT INTO subscription_tiers (name, description, monthly_price_cents, annual_price_cents, features, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                rusqlite::params![req.name.trim(), req.description, req.monthly_price_cents, req.annual_price_cents, &features, &now],
            )?;
            conn.last_insert_rowid()
        };
        self.get_tier(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn update_tier(&self, id: i64, update: &UpdateTierRequest) -> SqliteResult<Option<SubscriptionTier>> {
        let now = Utc::now().to_rfc3339();
        let features = update
            .features
            .as_ref()
            .map(|f| serde_json::to_string(f).unwrap_or_else(|_| "[]".to_string()));
        let is_active = update.is_active.map(|a| a as i64);
        let rows = self.conn.lock().execute(
            "UPDATE subscription_tiers SET
                description = COALESCE(?1, description),
                monthly_price_cents = COALESCE(?2, monthly_price_cents),
                annual_price_cents = COALESCE(?3, annual_price_cents),
                features = COALESCE(?4, features),
                is_active = COALESCE(?5, is_active),
                updated_at = ?6
             WHERE id = ?7",
            rusqlite::params![
                update.description,
                update.monthly_price_cents,
                update.annual_price_cents,
                features,
                is_active,
                &now,
                id
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_tier(id)
    }

    pub fn get_active_subscription(&self, user_id: i64) -> SqliteResult<Option<UserSubscription>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE s.user_id = ?1 AND s.status = 'active' ORDER BY s.id DESC LIMIT 1", SUBSCRIPTION_SELECT),
            [user_id],
            Self::row_to_subscription,
        )
        .optional()
    }

    /// Switch a user onto `tier`: cancel any active subscription, open a new one and
    /// issue its first invoice. Free tiers are invoiced as already paid.
    pub fn subscribe(
        &self,
        user_id: i64,
        tier: &SubscriptionTier,
        cycle: BillingCycle,
    ) -> SqliteResult<(UserSubscription, Invoice)> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let start = Utc::now();
        let now = start.to_rfc3339();
        let end = period_end(start, cycle).to_rfc3339();
        let amount = tier.price_for(cycle);

        tx.execute(
            "UPDATE user_subscriptions SET status = 'cancelled', cancelled_at = ?1 WHERE user_id = ?2 AND status = 'active'",
            rusqlite::params![&now, user_id],
        )?;
        tx.execute(
            "INSERT INTO user_subscriptions (user_id, tier_id, billing_cycle, status, current_period_start, current_period_end, created_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?4)",
            rusqlite::params![user_id, tier.id, cycle.as_ref(), &now, &end],
        )?;
        let subscription_id = tx.last_insert_rowid();

        let (status, paid_at) = if amount == 0 {
            (InvoiceStatus::Paid, Some(now.clone()))
        } else {
            (InvoiceStatus::Pending, None)
        };
        tx.execute(
            "INSERT INTO invoices (user_id, subscription_id, amount_cents, currency, status, issued_at, paid_at)
             VALUES (?1, ?2, ?3, 'usd', ?4, ?5, ?6)",
            rusqlite::params![user_id, subscription_id, amount, status.as_ref(), &now, paid_at],
        )?;
        let invoice_id = tx.last_insert_rowid();

        let subscription = tx.query_row(
            &format!("{} WHERE s.id = ?1", SUBSCRIPTION_SELECT),
            [subscription_id],
            Self::row_to_subscription,
        )?;
        let invoice = tx.query_row(
            &format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLUMNS),
            [invoice_id],
            Self::row_to_invoice,
        )?;

        tx.commit()?;
        Ok((subscription, invoice))
    }

    /// Cancel the active subscription; pending invoices for it are voided
    pub fn cancel_subscription(&self, user_id: i64) -> SqliteResult<Option<UserSubscription>> {
        let Some(active) = self.get_active_subscription(user_id)? else {
            return Ok(None);
        };

        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "UPDATE user_subscriptions SET status = 'cancelled', cancelled_at = ?1 WHERE id = ?2",
                rusqlite::params![&now, active.id],
            )?;
            tx.execute(
                "UPDATE invoices SET status = 'void' WHERE subscription_id = ?1 AND status = 'pending'",
                [active.id],
            )?;
            tx.commit()?;
        }

        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE s.id = ?1", SUBSCRIPTION_SELECT),
            [active.id],
            Self::row_to_subscription,
        )
        .optional()
    }

    pub fn list_invoices(&self, user_id: i64) -> SqliteResult<Vec<Invoice>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM invoices WHERE user_id = ?1 ORDER BY issued_at DESC, id DESC",
            INVOICE_COLUMNS
        ))?;
        let invoices = stmt
            .query_map([user_id], Self::row_to_invoice)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(invoices)
    }

    pub fn get_invoice(&self, user_id: i64, id: i64) -> SqliteResult<Option<Invoice>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM invoices WHERE id = ?1 AND user_id = ?2", INVOICE_COLUMNS),
            [id, user_id],
            Self::row_to_invoice,
        )
        .optional()
    }

    /// Record a payment and settle its invoice. Returns None (and writes nothing)
    /// when the invoice is no longer pending.
    pub fn record_payment(&self, user_id: i64, req: &CreatePaymentRequest) -> SqliteResult<Option<Payment>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let settled = tx.execute(
            "UPDATE invoices SET status = 'paid', paid_at = ?1 WHERE id = ?2 AND user_id = ?3 AND status = 'pending'",
            rusqlite::params![&now, req.invoice_id, user_id],
        )?;
        if settled == 0 {
            // Dropping the transaction rolls it back
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO payments (user_id, invoice_id, amount_cents, method, reference, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![user_id, req.invoice_id, req.amount_cents, req.method.trim(), req.reference, &now],
        )?;
        let payment_id = tx.last_insert_rowid();
        let payment = tx.query_row(
            &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS),
            [payment_id],
            Self::row_to_payment,
        )?;

        tx.commit()?;
        Ok(Some(payment))
    }

    pub fn list_payments(&self, user_id: i64) -> SqliteResult<Vec<Payment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payments WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        ))?;
        let payments = stmt
            .query_map([user_id], Self::row_to_payment)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriptionStatus;
    use chrono::TimeZone;

    #[test]
    fn test_period_end() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(period_end(start, BillingCycle::Monthly), Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());
        assert_eq!(period_end(start, BillingCycle::Annual), Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_subscribe_replaces_active_subscription() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        let starter = db.get_tier_by_name("Starter").unwrap().unwrap();
        let pro = db.get_tier_by_name("Professional").unwrap().unwrap();

        let (first, invoice) = db.subscribe(user.id, &starter, BillingCycle::Monthly).unwrap();
        assert_eq!(invoice.amount_cents, 2900);
        assert_eq!(invoice.status, InvoiceStatus::Pending);

        let (second, invoice) = db.subscribe(user.id, &pro, BillingCycle::Annual).unwrap();
        assert_eq!(invoice.amount_cents, 99000);

        let active = db.get_active_subscription(user.id).unwrap().unwrap();
        assert_eq!(active.id, second.id);
        assert_eq!(active.tier_name, "Professional");
        assert_ne!(first.id, second.id);

        let conn = db.conn.lock();
        let active_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM user_subscriptions WHERE user_id = ?1 AND status = 'active'",
                [user.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(active_count, 1);
    }

    #[test]
    fn test_free_tier_invoice_is_paid() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        let free = db.get_tier_by_name("Free").unwrap().unwrap();

        let (_, invoice) = db.subscribe(user.id, &free, BillingCycle::Monthly).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.paid_at.is_some());
    }

    #[test]
    fn test_payment_settles_invoice_once() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        let starter = db.get_tier_by_name("Starter").unwrap().unwrap();
        let (_, invoice) = db.subscribe(user.id, &starter, BillingCycle::Monthly).unwrap();

        let req = CreatePaymentRequest {
            invoice_id: invoice.id,
            amount_cents: invoice.amount_cents,
            method: "card".to_string(),
            reference: Some("ch_123".to_string()),
        };
        let payment = db.record_payment(user.id, &req).unwrap().unwrap();
        assert_eq!(payment.amount_cents, 2900);
        assert_eq!(db.get_invoice(user.id, invoice.id).unwrap().unwrap().status, InvoiceStatus::Paid);

        assert!(db.record_payment(user.id, &req).unwrap().is_none());
        assert_eq!(db.list_payments(user.id).unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_voids_pending_invoice() {
        let db = Database::new(":memory:").unwrap();
        let user = db.create_user("a@example.com", "hash", None).unwrap();
        let starter = db.get_tier_by_name("Starter").unwrap().unwrap();
        let (_, invoice) = db.subscribe(user.id, &starter, BillingCycle::Monthly).unwrap();

        let cancelled = db.cancel_subscription(user.id).unwrap().unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(db.get_invoice(user.id, invoice.id).unwrap().unwrap().status, InvoiceStatus::Void);
        assert!(db.cancel_subscription(user.id).unwrap().is_none());
    }

    #[test]
    fn test_tier_admin_updates() {
        let db = Database::new(":memory:").unwrap();
        let tier = db
            .create_tier(&CreateTierRequest {
                name: "Enterprise".to_string(),
                description: None,
                monthly_price_cents: 49900,
                annual_price_cents: 499000,
                features: vec!["SSO".to_string()],
            })
            .unwrap();
        assert_eq!(tier.features, vec!["SSO".to_string()]);

        db.update_tier(tier.id, &UpdateTierRequest { is_active: Some(false), ..Default::default() })
            .unwrap();
        assert_eq!(db.list_tiers(true).unwrap().len(), 3);
        assert_eq!(db.list_tiers(false).unwrap().len(), 4);
    }
}
