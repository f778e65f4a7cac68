//! `PostgreSQL` implementation of the callboard storage provider.
//!
//! Documents (gigs, templates, performers, fee records) are stored as
//! `JSONB` with the columns the engine queries by — venue id, status,
//! clearing deadline — extracted alongside. Venue id sets live in `UUID[]`
//! columns mutated only by single-statement union/remove updates, so
//! concurrent cross-reference writes for one venue converge without a
//! read-modify-write cycle. The keyed ledger move (`settle_fee`) runs in
//! one transaction with the fee row locked, which is what keeps the
//! record's status, the performer's balances, and the gig's status in
//! agreement.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE venues (
//!     id           UUID PRIMARY KEY,
//!     name         TEXT NOT NULL,
//!     gig_ids      UUID[] NOT NULL DEFAULT '{}',
//!     template_ids UUID[] NOT NULL DEFAULT '{}'
//! );
//!
//! CREATE TABLE gigs (
//!     id       UUID PRIMARY KEY,
//!     venue_id UUID NOT NULL,
//!     status   TEXT NOT NULL,
//!     document JSONB NOT NULL
//! );
//!
//! CREATE TABLE templates (
//!     id       UUID PRIMARY KEY,
//!     venue_id UUID NOT NULL,
//!     document JSONB NOT NULL
//! );
//!
//! CREATE TABLE performers (
//!     id       UUID PRIMARY KEY,
//!     document JSONB NOT NULL
//! );
//!
//! CREATE TABLE fee_records (
//!     gig_id       UUID PRIMARY KEY,
//!     performer_id UUID NOT NULL,
//!     status       TEXT NOT NULL,
//!     clears_at    TIMESTAMPTZ,
//!     document     JSONB NOT NULL
//! );
//! ```

use callboard_engine::error::{EngineError, Result};
use callboard_engine::providers::MarketplaceStore;
use callboard_engine::state::{
    FeeRecord, FeeStatus, Gig, GigStatus, PerformerProfile, Template, VenueProfile,
};
use callboard_engine::types::{GigId, PerformerId, TemplateId, TransferId, VenueId};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::future::Future;
use uuid::Uuid;

fn storage_error(error: sqlx::Error) -> EngineError {
    EngineError::Storage(error.to_string())
}

fn codec_error(error: serde_json::Error) -> EngineError {
    EngineError::Storage(format!("document codec: {error}"))
}

fn fee_status_label(status: FeeStatus) -> &'static str {
    status.label()
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(codec_error)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(codec_error)
}

/// `PostgreSQL`-backed marketplace store.
#[derive(Debug, Clone)]
pub struct PostgresMarketplaceStore {
    pool: PgPool,
}

impl PostgresMarketplaceStore {
    /// Connect to the database.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(storage_error)?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a transient storage error if any statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS venues (
                id           UUID PRIMARY KEY,
                name         TEXT NOT NULL,
                gig_ids      UUID[] NOT NULL DEFAULT '{}',
                template_ids UUID[] NOT NULL DEFAULT '{}'
            )",
            "CREATE TABLE IF NOT EXISTS gigs (
                id       UUID PRIMARY KEY,
                venue_id UUID NOT NULL,
                status   TEXT NOT NULL,
                document JSONB NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_gigs_venue ON gigs(venue_id)",
            "CREATE INDEX IF NOT EXISTS idx_gigs_status ON gigs(status)",
            "CREATE TABLE IF NOT EXISTS templates (
                id       UUID PRIMARY KEY,
                venue_id UUID NOT NULL,
                document JSONB NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS performers (
                id       UUID PRIMARY KEY,
                document JSONB NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS fee_records (
                gig_id       UUID PRIMARY KEY,
                performer_id UUID NOT NULL,
                status       TEXT NOT NULL,
                clears_at    TIMESTAMPTZ,
                document     JSONB NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_fee_records_performer
                ON fee_records(performer_id, status)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }

        tracing::info!("schema ensured");
        Ok(())
    }

    fn row_to_gig(row: &PgRow) -> Result<Gig> {
        let document: serde_json::Value = row.try_get("document").map_err(storage_error)?;
        decode(document)
    }

    fn row_to_fee_record(row: &PgRow) -> Result<FeeRecord> {
        let document: serde_json::Value = row.try_get("document").map_err(storage_error)?;
        decode(document)
    }

    async fn write_gig_document(&self, gig: &Gig) -> Result<()> {
        let document = encode(gig)?;
        sqlx::query(
            "UPDATE gigs SET venue_id = $2, status = $3, document = $4 WHERE id = $1",
        )
        .bind(gig.id.as_uuid())
        .bind(gig.venue_id.as_uuid())
        .bind(gig.status.label())
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(storage_error)
        .and_then(|result| {
            if result.rows_affected() == 0 {
                Err(EngineError::GigNotFound(gig.id))
            } else {
                Ok(())
            }
        })
    }
}

impl MarketplaceStore for PostgresMarketplaceStore {
    fn gig(&self, id: GigId) -> impl Future<Output = Result<Option<Gig>>> + Send {
        let this = self.clone();
        async move {
            let row = sqlx::query("SELECT document FROM gigs WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&this.pool)
                .await
                .map_err(storage_error)?;

            row.as_ref().map(Self::row_to_gig).transpose()
        }
    }

    fn insert_gigs(&self, gigs: &[Gig]) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        let gigs = gigs.to_vec();
        async move {
            // One transaction: the batch lands all-or-nothing.
            let mut tx = this.pool.begin().await.map_err(storage_error)?;

            for gig in &gigs {
                let document = encode(gig)?;
                sqlx::query(
                    "INSERT INTO gigs (id, venue_id, status, document)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (id) DO NOTHING",
                )
                .bind(gig.id.as_uuid())
                .bind(gig.venue_id.as_uuid())
                .bind(gig.status.label())
                .bind(document)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
            }

            tx.commit().await.map_err(storage_error)
        }
    }

    fn update_gig(&self, gig: &Gig) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        let gig = gig.clone();
        async move { this.write_gig_document(&gig).await }
    }

    fn set_gig_status(
        &self,
        id: GigId,
        status: GigStatus,
    ) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        async move {
            let status_document = encode(&status)?;
            let result = sqlx::query(
                "UPDATE gigs
                 SET status = $2,
                     document = jsonb_set(document, '{status}', $3)
                 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(status.label())
            .bind(status_document)
            .execute(&this.pool)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(EngineError::GigNotFound(id));
            }
            Ok(())
        }
    }

    fn delete_gig(&self, id: GigId) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        async move {
            let mut tx = this.pool.begin().await.map_err(storage_error)?;

            let fee_status: Option<String> =
                sqlx::query_scalar("SELECT status FROM fee_records WHERE gig_id = $1 FOR UPDATE")
                    .bind(id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage_error)?;

            match fee_status.as_deref() {
                Some("pending") => {
                    return Err(EngineError::DeletionBlocked {
                        gig_id: id,
                        fee_state: "pending",
                    });
                },
                Some("in_dispute") => {
                    return Err(EngineError::DeletionBlocked {
                        gig_id: id,
                        fee_state: "in_dispute",
                    });
                },
                // Settled records are archived with the gig.
                Some(_) => {
                    sqlx::query("DELETE FROM fee_records WHERE gig_id = $1")
                        .bind(id.as_uuid())
                        .execute(&mut *tx)
                        .await
                        .map_err(storage_error)?;
                },
                None => {},
            }

            let result = sqlx::query("DELETE FROM gigs WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(EngineError::GigNotFound(id));
            }

            tx.commit().await.map_err(storage_error)
        }
    }

    fn gigs_for_venue(&self, venue: VenueId) -> impl Future<Output = Result<Vec<Gig>>> + Send {
        let this = self.clone();
        async move {
            let rows = sqlx::query("SELECT document FROM gigs WHERE venue_id = $1")
                .bind(venue.as_uuid())
                .fetch_all(&this.pool)
                .await
                .map_err(storage_error)?;

            rows.iter().map(Self::row_to_gig).collect()
        }
    }

    fn active_gigs(&self) -> impl Future<Output = Result<Vec<Gig>>> + Send {
        let this = self.clone();
        async move {
            let rows = sqlx::query(
                "SELECT document FROM gigs
                 WHERE status NOT IN ('cleared', 'refunded', 'closed')",
            )
            .fetch_all(&this.pool)
            .await
            .map_err(storage_error)?;

            rows.iter().map(Self::row_to_gig).collect()
        }
    }

    fn venue(&self, id: VenueId) -> impl Future<Output = Result<Option<VenueProfile>>> + Send {
        let this = self.clone();
        async move {
            let row = sqlx::query(
                "SELECT id, name, gig_ids, template_ids FROM venues WHERE id = $1",
            )
            .bind(id.as_uuid())
            .fetch_optional(&this.pool)
            .await
            .map_err(storage_error)?;

            let Some(row) = row else {
                return Ok(None);
            };

            let venue_id: Uuid = row.try_get("id").map_err(storage_error)?;
            let name: String = row.try_get("name").map_err(storage_error)?;
            let gig_ids: Vec<Uuid> = row.try_get("gig_ids").map_err(storage_error)?;
            let template_ids: Vec<Uuid> = row.try_get("template_ids").map_err(storage_error)?;

            Ok(Some(VenueProfile {
                id: VenueId::from_uuid(venue_id),
                name,
                gig_ids: gig_ids.into_iter().map(GigId::from_uuid).collect(),
                template_ids: template_ids.into_iter().map(TemplateId::from_uuid).collect(),
            }))
        }
    }

    fn insert_venue(&self, venue: &VenueProfile) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        let venue = venue.clone();
        async move {
            let gig_ids: Vec<Uuid> = venue.gig_ids.iter().map(|id| *id.as_uuid()).collect();
            let template_ids: Vec<Uuid> =
                venue.template_ids.iter().map(|id| *id.as_uuid()).collect();

            sqlx::query(
                "INSERT INTO venues (id, name, gig_ids, template_ids)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
            )
            .bind(venue.id.as_uuid())
            .bind(&venue.name)
            .bind(&gig_ids)
            .bind(&template_ids)
            .execute(&this.pool)
            .await
            .map_err(storage_error)
            .map(|_| ())
        }
    }

    fn add_gig_refs(
        &self,
        venue: VenueId,
        gigs: &[GigId],
    ) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        let gigs: Vec<Uuid> = gigs.iter().map(|id| *id.as_uuid()).collect();
        async move {
            // Single-statement union: concurrent registrations converge
            // and re-adding an id is a no-op.
            let result = sqlx::query(
                "UPDATE venues
                 SET gig_ids = ARRAY(SELECT DISTINCT unnest(gig_ids || $2::uuid[]))
                 WHERE id = $1",
            )
            .bind(venue.as_uuid())
            .bind(&gigs)
            .execute(&this.pool)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(EngineError::VenueNotFound(venue));
            }
            Ok(())
        }
    }

    fn remove_gig_ref(
        &self,
        venue: VenueId,
        gig: GigId,
    ) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        async move {
            let result = sqlx::query(
                "UPDATE venues SET gig_ids = array_remove(gig_ids, $2) WHERE id = $1",
            )
            .bind(venue.as_uuid())
            .bind(gig.as_uuid())
            .execute(&this.pool)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(EngineError::VenueNotFound(venue));
            }
            Ok(())
        }
    }

    fn add_template_ref(
        &self,
        venue: VenueId,
        template: TemplateId,
    ) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        async move {
            let result = sqlx::query(
                "UPDATE venues
                 SET template_ids = ARRAY(SELECT DISTINCT unnest(template_ids || $2::uuid))
                 WHERE id = $1",
            )
            .bind(venue.as_uuid())
            .bind(template.as_uuid())
            .execute(&this.pool)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(EngineError::VenueNotFound(venue));
            }
            Ok(())
        }
    }

    fn insert_template(&self, template: &Template) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        let template = template.clone();
        async move {
            let document = encode(&template)?;
            sqlx::query(
                "INSERT INTO templates (id, venue_id, document)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document",
            )
            .bind(template.id.as_uuid())
            .bind(template.venue_id.as_uuid())
            .bind(document)
            .execute(&this.pool)
            .await
            .map_err(storage_error)
            .map(|_| ())
        }
    }

    fn template(&self, id: TemplateId) -> impl Future<Output = Result<Option<Template>>> + Send {
        let this = self.clone();
        async move {
            let document: Option<serde_json::Value> =
                sqlx::query_scalar("SELECT document FROM templates WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&this.pool)
                    .await
                    .map_err(storage_error)?;

            document.map(decode).transpose()
        }
    }

    fn performer(
        &self,
        id: PerformerId,
    ) -> impl Future<Output = Result<Option<PerformerProfile>>> + Send {
        let this = self.clone();
        async move {
            let document: Option<serde_json::Value> =
                sqlx::query_scalar("SELECT document FROM performers WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&this.pool)
                    .await
                    .map_err(storage_error)?;

            document.map(decode).transpose()
        }
    }

    fn insert_performer(
        &self,
        performer: &PerformerProfile,
    ) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        let performer = performer.clone();
        async move {
            let document = encode(&performer)?;
            sqlx::query(
                "INSERT INTO performers (id, document)
                 VALUES ($1, $2)
                 ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document",
            )
            .bind(performer.id.as_uuid())
            .bind(document)
            .execute(&this.pool)
            .await
            .map_err(storage_error)
            .map(|_| ())
        }
    }

    fn insert_fee_record(&self, record: &FeeRecord) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        let record = record.clone();
        async move {
            let document = encode(&record)?;
            // Retry-idempotent: an existing record stays as-is.
            sqlx::query(
                "INSERT INTO fee_records (gig_id, performer_id, status, clears_at, document)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (gig_id) DO NOTHING",
            )
            .bind(record.gig_id.as_uuid())
            .bind(record.performer_id.as_uuid())
            .bind(fee_status_label(record.status))
            .bind(record.clears_at)
            .bind(document)
            .execute(&this.pool)
            .await
            .map_err(storage_error)
            .map(|_| ())
        }
    }

    fn fee_record(&self, gig: GigId) -> impl Future<Output = Result<Option<FeeRecord>>> + Send {
        let this = self.clone();
        async move {
            let row = sqlx::query("SELECT document FROM fee_records WHERE gig_id = $1")
                .bind(gig.as_uuid())
                .fetch_optional(&this.pool)
                .await
                .map_err(storage_error)?;

            row.as_ref().map(Self::row_to_fee_record).transpose()
        }
    }

    fn fee_records_for_performer(
        &self,
        performer: PerformerId,
        status: FeeStatus,
    ) -> impl Future<Output = Result<Vec<FeeRecord>>> + Send {
        let this = self.clone();
        async move {
            let rows = sqlx::query(
                "SELECT document FROM fee_records WHERE performer_id = $1 AND status = $2",
            )
            .bind(performer.as_uuid())
            .bind(fee_status_label(status))
            .fetch_all(&this.pool)
            .await
            .map_err(storage_error)?;

            rows.iter().map(Self::row_to_fee_record).collect()
        }
    }

    fn settle_fee(
        &self,
        gig: GigId,
        transfer: Option<TransferId>,
    ) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        async move {
            let mut tx = this.pool.begin().await.map_err(storage_error)?;

            let row = sqlx::query("SELECT document FROM fee_records WHERE gig_id = $1 FOR UPDATE")
                .bind(gig.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;

            let Some(row) = row else {
                return Err(EngineError::GigNotFound(gig));
            };
            let mut record = Self::row_to_fee_record(&row)?;

            match record.status {
                // At-most-once: a second settle is a no-op, balances are
                // never added twice.
                FeeStatus::Cleared => return Ok(()),
                FeeStatus::InDispute => return Err(EngineError::FeeDisputed(gig)),
                FeeStatus::Refunded => {
                    return Err(EngineError::IllegalTransition {
                        from: "refunded",
                        to: "cleared",
                    });
                },
                FeeStatus::Pending => {},
            }

            record.status = FeeStatus::Cleared;
            record.clears_at = None;
            record.transfer_id = transfer;

            let record_document = encode(&record)?;
            sqlx::query(
                "UPDATE fee_records
                 SET status = $2, clears_at = NULL, document = $3
                 WHERE gig_id = $1",
            )
            .bind(gig.as_uuid())
            .bind(fee_status_label(record.status))
            .bind(record_document)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            let performer_document: Option<serde_json::Value> =
                sqlx::query_scalar("SELECT document FROM performers WHERE id = $1 FOR UPDATE")
                    .bind(record.performer_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage_error)?;

            let Some(performer_document) = performer_document else {
                return Err(EngineError::PerformerNotFound(record.performer_id));
            };
            let mut performer: PerformerProfile = decode(performer_document)?;
            performer.total_earned = performer.total_earned.saturating_add(record.amount);
            performer.withdrawable = performer.withdrawable.saturating_add(record.amount);

            sqlx::query("UPDATE performers SET document = $2 WHERE id = $1")
                .bind(record.performer_id.as_uuid())
                .bind(encode(&performer)?)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;

            let status = GigStatus::Cleared {
                performer: record.performer_id,
            };
            sqlx::query(
                "UPDATE gigs
                 SET status = $2, document = jsonb_set(document, '{status}', $3)
                 WHERE id = $1",
            )
            .bind(gig.as_uuid())
            .bind(status.label())
            .bind(encode(&status)?)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            tx.commit().await.map_err(storage_error)
        }
    }

    fn mark_fee_disputed(&self, gig: GigId) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        async move {
            let mut tx = this.pool.begin().await.map_err(storage_error)?;

            let row = sqlx::query("SELECT document FROM fee_records WHERE gig_id = $1 FOR UPDATE")
                .bind(gig.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;

            let Some(row) = row else {
                return Err(EngineError::GigNotFound(gig));
            };
            let mut record = Self::row_to_fee_record(&row)?;

            match record.status {
                FeeStatus::InDispute => return Ok(()),
                FeeStatus::Cleared => {
                    return Err(EngineError::IllegalTransition {
                        from: "cleared",
                        to: "in_dispute",
                    });
                },
                FeeStatus::Refunded => {
                    return Err(EngineError::IllegalTransition {
                        from: "refunded",
                        to: "in_dispute",
                    });
                },
                FeeStatus::Pending => {},
            }

            record.status = FeeStatus::InDispute;
            record.clears_at = None;

            sqlx::query(
                "UPDATE fee_records
                 SET status = $2, clears_at = NULL, document = $3
                 WHERE gig_id = $1",
            )
            .bind(gig.as_uuid())
            .bind(fee_status_label(record.status))
            .bind(encode(&record)?)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            let status = GigStatus::InDispute {
                performer: record.performer_id,
            };
            sqlx::query(
                "UPDATE gigs
                 SET status = $2, document = jsonb_set(document, '{status}', $3)
                 WHERE id = $1",
            )
            .bind(gig.as_uuid())
            .bind(status.label())
            .bind(encode(&status)?)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            tx.commit().await.map_err(storage_error)
        }
    }

    fn mark_fee_refunded(&self, gig: GigId) -> impl Future<Output = Result<()>> + Send {
        let this = self.clone();
        async move {
            let mut tx = this.pool.begin().await.map_err(storage_error)?;

            let row = sqlx::query("SELECT document FROM fee_records WHERE gig_id = $1 FOR UPDATE")
                .bind(gig.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;

            let Some(row) = row else {
                return Err(EngineError::GigNotFound(gig));
            };
            let mut record = Self::row_to_fee_record(&row)?;

            match record.status {
                FeeStatus::Refunded => return Ok(()),
                FeeStatus::Cleared => {
                    return Err(EngineError::IllegalTransition {
                        from: "cleared",
                        to: "refunded",
                    });
                },
                FeeStatus::Pending | FeeStatus::InDispute => {},
            }

            record.status = FeeStatus::Refunded;
            record.clears_at = None;

            sqlx::query(
                "UPDATE fee_records
                 SET status = $2, clears_at = NULL, document = $3
                 WHERE gig_id = $1",
            )
            .bind(gig.as_uuid())
            .bind(fee_status_label(record.status))
            .bind(encode(&record)?)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            sqlx::query(
                "UPDATE gigs
                 SET status = $2, document = jsonb_set(document, '{status}', $3)
                 WHERE id = $1",
            )
            .bind(gig.as_uuid())
            .bind(GigStatus::Refunded.label())
            .bind(encode(&GigStatus::Refunded)?)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            tx.commit().await.map_err(storage_error)
        }
    }

    fn pending_fees_due(
        &self,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<FeeRecord>>> + Send {
        let this = self.clone();
        async move {
            let rows = sqlx::query(
                "SELECT document FROM fee_records
                 WHERE status = 'pending' AND clears_at IS NOT NULL AND clears_at <= $1",
            )
            .bind(at)
            .fetch_all(&this.pool)
            .await
            .map_err(storage_error)?;

            rows.iter().map(Self::row_to_fee_record).collect()
        }
    }
}
