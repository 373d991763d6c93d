use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;
use uuid::Uuid;

use super::CustomerRecord;
use super::DocumentStore;
use super::MarkerWrite;
use super::UserProfile;
use crate::domain::MailTask;
use crate::domain::ReminderMarker;
use crate::domain::SubscriptionStatus;
use crate::domain::ABANDONED_REGISTRATION;

type PgTransaction = Transaction<'static, Postgres>;

/// `DocumentStore` backed by Postgres (see `migrations/`).
///
/// Marker writes rely on the `(user_id, reminder_kind)` primary key: several
/// scans may race to the insert, but `ON CONFLICT DO NOTHING` lets exactly one
/// of them win, and a loser writes nothing.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

/// Only ever called inside a transaction, so that a batch of tasks (or a
/// marker and its task) commit together.
async fn insert_mail(
    transaction: &mut PgTransaction,
    task: &MailTask,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO mail_queue
            (mail_id, recipient, template_name, template_data, created_at)
        VALUES
            ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&task.to)
    .bind(&task.template.name)
    .bind(Json(&task.template.data))
    .bind(Utc::now())
    .execute(&mut **transaction)
    .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PgStore {
    #[tracing::instrument(name = "Checking for entitled subscription", skip(self))]
    async fn has_entitled_subscription(
        &self,
        user_id: &str,
    ) -> Result<bool, anyhow::Error> {
        let entitled: Vec<String> = SubscriptionStatus::ENTITLED
            .iter()
            .map(|s| s.to_string())
            .collect();
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM customer_subscriptions
                WHERE
                    user_id = $1 AND
                    status = ANY($2)
            )
            "#,
        )
        .bind(user_id)
        .bind(entitled)
        .fetch_one(&self.pool)
        .await
        .context("could not query subscriptions")?;
        Ok(exists)
    }

    #[tracing::instrument(name = "Getting customer record", skip(self))]
    async fn customer(
        &self,
        user_id: &str,
    ) -> Result<Option<CustomerRecord>, anyhow::Error> {
        let customer = sqlx::query_as::<_, CustomerRecord>(
            r#"
            SELECT user_id, stripe_id, email
            FROM customers
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("could not query customers")?;
        Ok(customer)
    }

    #[tracing::instrument(name = "Getting customer record by provider id", skip(self))]
    async fn customer_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> Result<Option<CustomerRecord>, anyhow::Error> {
        let customer = sqlx::query_as::<_, CustomerRecord>(
            r#"
            SELECT user_id, stripe_id, email
            FROM customers
            WHERE stripe_id = $1
            "#,
        )
        .bind(stripe_id)
        .fetch_optional(&self.pool)
        .await
        .context("could not query customers")?;
        Ok(customer)
    }

    #[tracing::instrument(name = "Getting user profile", skip(self))]
    async fn user_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserProfile>, anyhow::Error> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, email, display_name
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("could not query users")?;
        Ok(profile)
    }

    #[tracing::instrument(name = "Checking for reminder marker", skip(self))]
    async fn reminder_marker_exists(
        &self,
        user_id: &str,
    ) -> Result<bool, anyhow::Error> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reminder_markers
                WHERE
                    user_id = $1 AND
                    reminder_kind = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(ABANDONED_REGISTRATION)
        .fetch_one(&self.pool)
        .await
        .context("could not query reminder markers")?;
        Ok(exists)
    }

    #[tracing::instrument(
        name = "Recording reminder",
        skip_all,
        fields(user_id = %marker.user_id)
    )]
    async fn record_reminder(
        &self,
        marker: &ReminderMarker,
        mail: &MailTask,
    ) -> Result<MarkerWrite, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO reminder_markers
                (user_id, reminder_kind, sent_at, email, plan)
            VALUES
                ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&marker.user_id)
        .bind(ABANDONED_REGISTRATION)
        .bind(marker.sent_at)
        .bind(&marker.email)
        .bind(&marker.plan)
        .execute(&mut *transaction)
        .await
        .context("could not insert reminder marker")?
        .rows_affected()
            > 0;

        if !inserted {
            transaction.rollback().await?;
            return Ok(MarkerWrite::AlreadySent);
        }

        insert_mail(&mut transaction, mail)
            .await
            .context("could not enqueue reminder mail")?;
        transaction.commit().await?; // this is the commit point of the send
        Ok(MarkerWrite::Recorded)
    }

    #[tracing::instrument(name = "Enqueueing mail", skip_all, fields(n = tasks.len()))]
    async fn enqueue_mail(
        &self,
        tasks: &[MailTask],
    ) -> Result<(), anyhow::Error> {
        let mut transaction = self.pool.begin().await?;
        for task in tasks {
            insert_mail(&mut transaction, task)
                .await
                .with_context(|| format!("could not enqueue {} mail", task.template.name))?;
        }
        transaction.commit().await?;
        Ok(())
    }
}
