//! PostgreSQL seat store

use async_trait::async_trait;
use seatpool_shared::{OrganizationId, PlanTier, ProviderId};
use sqlx::{PgPool, Postgres, Transaction};

use crate::accessor::AssignmentAccessor;
use crate::error::{BillingError, BillingResult};
use crate::ledger::SeatLedger;
use crate::models::{AssignmentChange, ClientOrganizationSeatAssignment};
use crate::persistence::{PersistenceGateway, SeatChange};

const LEDGER_COLUMNS: &str =
    "id, provider_id, plan_tier, seat_minimum, purchased_seats, allocated_seats, revision";

/// Ledgers, organizations and provider links backed by PostgreSQL
#[derive(Clone)]
pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Conditional update: only matches the row at the revision it was read at
    async fn replace_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        ledger: &SeatLedger,
    ) -> BillingResult<SeatLedger> {
        let stored: Option<SeatLedger> = sqlx::query_as(&format!(
            r#"
            UPDATE provider_plans
            SET seat_minimum = $1,
                purchased_seats = $2,
                allocated_seats = $3,
                revision = revision + 1,
                updated_at = NOW()
            WHERE id = $4 AND revision = $5
            RETURNING {}
            "#,
            LEDGER_COLUMNS
        ))
        .bind(ledger.seat_minimum)
        .bind(ledger.purchased_seats)
        .bind(ledger.allocated_seats)
        .bind(ledger.id)
        .bind(ledger.revision)
        .fetch_optional(&mut **tx)
        .await?;

        stored.ok_or_else(|| {
            BillingError::ConcurrentModification(format!(
                "Provider {} plan tier {} changed since revision {}",
                ledger.provider_id, ledger.plan_tier, ledger.revision
            ))
        })
    }
}

#[async_trait]
impl AssignmentAccessor for PgSeatStore {
    async fn occupied_seats(&self, provider_id: ProviderId, plan_tier: PlanTier) -> BillingResult<i32> {
        let total: i32 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(seats), 0)::INT
            FROM provider_organizations
            WHERE provider_id = $1
              AND plan_tier = $2
              AND status = 'managed'
            "#,
        )
        .bind(provider_id)
        .bind(plan_tier)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

#[async_trait]
impl PersistenceGateway for PgSeatStore {
    async fn read_ledger(
        &self,
        provider_id: ProviderId,
        plan_tier: PlanTier,
    ) -> BillingResult<Option<SeatLedger>> {
        let ledger = sqlx::query_as(&format!(
            "SELECT {} FROM provider_plans WHERE provider_id = $1 AND plan_tier = $2",
            LEDGER_COLUMNS
        ))
        .bind(provider_id)
        .bind(plan_tier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ledger)
    }

    async fn read_ledgers(&self, provider_id: ProviderId) -> BillingResult<Vec<SeatLedger>> {
        let ledgers = sqlx::query_as(&format!(
            "SELECT {} FROM provider_plans WHERE provider_id = $1 ORDER BY created_at",
            LEDGER_COLUMNS
        ))
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ledgers)
    }

    async fn insert_ledger(&self, ledger: &SeatLedger) -> BillingResult<SeatLedger> {
        let stored: Option<SeatLedger> = sqlx::query_as(&format!(
            r#"
            INSERT INTO provider_plans
                (id, provider_id, plan_tier, seat_minimum, purchased_seats, allocated_seats, revision)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            ON CONFLICT (provider_id, plan_tier) DO NOTHING
            RETURNING {}
            "#,
            LEDGER_COLUMNS
        ))
        .bind(ledger.id)
        .bind(ledger.provider_id)
        .bind(ledger.plan_tier)
        .bind(ledger.seat_minimum)
        .bind(ledger.purchased_seats)
        .bind(ledger.allocated_seats)
        .fetch_optional(&self.pool)
        .await?;

        stored.ok_or_else(|| {
            BillingError::Validation(format!(
                "Provider {} already has a {} plan",
                ledger.provider_id, ledger.plan_tier
            ))
        })
    }

    async fn replace_ledger(&self, ledger: &SeatLedger) -> BillingResult<SeatLedger> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::replace_in_tx(&mut tx, ledger).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn replace_ledgers(&self, ledgers: &[SeatLedger]) -> BillingResult<Vec<SeatLedger>> {
        let mut tx = self.pool.begin().await?;

        let mut stored = Vec::with_capacity(ledgers.len());
        for ledger in ledgers {
            // Dropping the transaction on error rolls back earlier rows
            stored.push(Self::replace_in_tx(&mut tx, ledger).await?);
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn read_assignment(
        &self,
        provider_id: ProviderId,
        organization_id: OrganizationId,
    ) -> BillingResult<Option<ClientOrganizationSeatAssignment>> {
        let assignment = sqlx::query_as(
            r#"
            SELECT provider_id, organization_id, plan_tier, seats, status
            FROM provider_organizations
            WHERE provider_id = $1 AND organization_id = $2
            "#,
        )
        .bind(provider_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(assignment)
    }

    async fn apply_seat_change(&self, change: &SeatChange) -> BillingResult<SeatLedger> {
        let mut tx = self.pool.begin().await?;

        let stored = Self::replace_in_tx(&mut tx, &change.ledger).await?;

        if let Some(organization) = &change.organization {
            sqlx::query(
                r#"
                UPDATE organizations
                SET plan_tier = $1, seats = $2, status = $3, updated_at = NOW()
                WHERE id = $4
                "#,
            )
            .bind(organization.plan_tier)
            .bind(organization.seats)
            .bind(organization.status)
            .bind(organization.id)
            .execute(&mut *tx)
            .await?;
        }

        match &change.assignment {
            Some(AssignmentChange::Upsert(assignment)) => {
                sqlx::query(
                    r#"
                    INSERT INTO provider_organizations
                        (provider_id, organization_id, plan_tier, seats, status)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (provider_id, organization_id) DO UPDATE SET
                        plan_tier = EXCLUDED.plan_tier,
                        seats = EXCLUDED.seats,
                        status = EXCLUDED.status,
                        updated_at = NOW()
                    "#,
                )
                .bind(assignment.provider_id)
                .bind(assignment.organization_id)
                .bind(assignment.plan_tier)
                .bind(assignment.seats)
                .bind(assignment.status)
                .execute(&mut *tx)
                .await?;
            }
            Some(AssignmentChange::Delete {
                provider_id,
                organization_id,
            }) => {
                sqlx::query(
                    "DELETE FROM provider_organizations WHERE provider_id = $1 AND organization_id = $2",
                )
                .bind(*provider_id)
                .bind(*organization_id)
                .execute(&mut *tx)
                .await?;
            }
            None => {}
        }

        tx.commit().await?;
        Ok(stored)
    }
}
