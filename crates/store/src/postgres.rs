use async_trait::async_trait;
use common::{ExternalUserId, IdentityId, TicketId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Identity, IdentityRepository, NewIdentity, NewTicket, Result, StoreError, Ticket,
    TicketRepository,
};

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

fn external_id(raw: i64, column: &str) -> Result<ExternalUserId> {
    ExternalUserId::new(raw)
        .ok_or_else(|| StoreError::Corrupt(format!("{column} must be positive, got {raw}")))
}

/// PostgreSQL-backed identity repository.
#[derive(Clone)]
pub struct PostgresIdentityRepository {
    pool: PgPool,
}

impl PostgresIdentityRepository {
    /// Creates a new repository over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_identity(row: PgRow) -> Result<Identity> {
        let external_user_id = row
            .try_get::<Option<i64>, _>("external_user_id")?
            .map(|raw| external_id(raw, "external_user_id"))
            .transpose()?;

        Ok(Identity {
            id: IdentityId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            external_user_id,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl IdentityRepository for PostgresIdentityRepository {
    async fn create(&self, identity: NewIdentity) -> Result<Identity> {
        let record = identity.into_identity();

        sqlx::query(
            r#"
            INSERT INTO identities
                (id, name, last_name, email, password_hash, external_user_id,
                 created_by, updated_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.name)
        .bind(&record.last_name)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.external_user_id.map(|id| id.get()))
        .bind(&record.created_by)
        .bind(&record.updated_by)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                tracing::debug!(email = %record.email, "identity insert hit unique constraint");
                return StoreError::DuplicateKey {
                    field: "email",
                    value: record.email.clone(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(record)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, last_name, email, password_hash, external_user_id,
                   created_by, updated_by, created_at, updated_at
            FROM identities
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_identity).transpose()
    }

    async fn delete(&self, id: IdentityId) -> Result<()> {
        sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// PostgreSQL-backed ticket repository.
#[derive(Clone)]
pub struct PostgresTicketRepository {
    pool: PgPool,
}

impl PostgresTicketRepository {
    /// Creates a new repository over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_ticket(row: PgRow) -> Result<Ticket> {
        Ok(Ticket {
            id: TicketId::from_uuid(row.try_get::<Uuid, _>("id")?),
            external_ticket_id: row.try_get("external_ticket_id")?,
            creator_email: row.try_get("creator_email")?,
            creator_external_id: external_id(
                row.try_get("creator_external_id")?,
                "creator_external_id",
            )?,
            customer_external_id: external_id(
                row.try_get("customer_external_id")?,
                "customer_external_id",
            )?,
            source_id: row.try_get("source_id")?,
            category_id: row.try_get("category_id")?,
            type_id: row.try_get("type_id")?,
            priority_id: row.try_get("priority_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const TICKET_COLUMNS: &str = "id, external_ticket_id, creator_email, creator_external_id, \
     customer_external_id, source_id, category_id, type_id, priority_id, title, description, \
     created_by, updated_by, created_at, updated_at";

#[async_trait]
impl TicketRepository for PostgresTicketRepository {
    async fn create(&self, ticket: NewTicket) -> Result<Ticket> {
        let record = ticket.into_ticket();

        sqlx::query(&format!(
            "INSERT INTO tickets ({TICKET_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(record.id.as_uuid())
        .bind(&record.external_ticket_id)
        .bind(&record.creator_email)
        .bind(record.creator_external_id.get())
        .bind(record.customer_external_id.get())
        .bind(record.source_id)
        .bind(record.category_id)
        .bind(record.type_id)
        .bind(record.priority_id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.created_by)
        .bind(&record.updated_by)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_by_external_id(&self, external_ticket_id: &str) -> Result<Option<Ticket>> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE external_ticket_id = $1 LIMIT 1"
        ))
        .bind(external_ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_ticket).transpose()
    }

    async fn list_by_creator(
        &self,
        creator_email: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Ticket>> {
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE ($1::TEXT IS NULL OR creator_email = $1) \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(creator_email)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_ticket).collect()
    }

    async fn count_by_creator(&self, creator_email: Option<&str>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE ($1::TEXT IS NULL OR creator_email = $1)",
        )
        .bind(creator_email)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
