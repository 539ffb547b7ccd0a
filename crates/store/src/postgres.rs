//! PostgreSQL document store
//!
//! All collections share one `documents` table keyed by (collection, key).
//! Commit locks every read document with `SELECT ... FOR UPDATE` in key
//! order, compares versions, then applies the writes. A write to a key the
//! transaction observed as absent is a plain INSERT, so a concurrent insert
//! surfaces as a unique violation and is reported as a conflict.

use std::collections::HashSet;

use enlist_common::StoreError;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{Clause, DocumentStore, Filter, Mutation, Precondition, StoredDocument, Version};

/// SQLSTATE codes that mean another transaction won the race
const CONFLICT_CODES: [&str; 3] = [
    "23505", // unique_violation
    "40001", // serialization_failure
    "40P01", // deadlock_detected
];

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_version(raw: i64) -> Result<Version, StoreError> {
    Version::try_from(raw).map_err(|_| StoreError::InvalidData(format!("negative version {raw}")))
}

fn is_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| CONFLICT_CODES.contains(&code.as_ref()))
}

/// Map a statement error, turning lost races into conflicts on the given document.
fn classify(err: sqlx::Error, collection: &str, key: Uuid) -> StoreError {
    if is_conflict(&err) {
        StoreError::conflict(collection, key)
    } else {
        StoreError::Connection(err)
    }
}

fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, clause: &Clause) {
    match clause {
        Clause::Eq { field, value } => {
            builder.push(" AND body -> ");
            builder.push_bind(field.clone());
            builder.push("::text = ");
            builder.push_bind(value.clone());
        }
        Clause::NotNull { field } => {
            builder.push(" AND COALESCE(jsonb_typeof(body -> ");
            builder.push_bind(field.clone());
            builder.push("::text), 'null') <> 'null'");
        }
        Clause::InIgnoreCase { field, values } => {
            builder.push(" AND lower(body ->> ");
            builder.push_bind(field.clone());
            builder.push("::text) = ANY(");
            builder.push_bind(values.clone());
            builder.push(")");
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    async fn fetch(
        &self,
        collection: &str,
        key: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let row: Option<(i64, Value)> = sqlx::query_as(
            r#"
            SELECT version, body
            FROM documents
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(version, body)| {
            Ok(StoredDocument {
                key,
                version: to_version(version)?,
                body,
            })
        })
        .transpose()
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT key, version, body FROM documents WHERE collection = ",
        );
        builder.push_bind(collection.to_string());
        for clause in filter.clauses() {
            push_clause(&mut builder, clause);
        }
        builder.push(" ORDER BY key");

        let rows: Vec<(Uuid, i64, Value)> = builder.build_query_as().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(key, version, body)| {
                Ok(StoredDocument {
                    key,
                    version: to_version(version)?,
                    body,
                })
            })
            .collect()
    }

    async fn commit(
        &self,
        mut preconditions: Vec<Precondition>,
        mutations: Vec<Mutation>,
    ) -> Result<(), StoreError> {
        preconditions.sort_by(|a, b| (a.collection, a.key).cmp(&(b.collection, b.key)));

        let mut tx = self.pool.begin().await?;

        for precondition in &preconditions {
            let current: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT version
                FROM documents
                WHERE collection = $1 AND key = $2
                FOR UPDATE
                "#,
            )
            .bind(precondition.collection)
            .bind(precondition.key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| classify(e, precondition.collection, precondition.key))?;

            let current = current.map(to_version).transpose()?;
            if current != precondition.expected {
                tracing::debug!(
                    collection = precondition.collection,
                    key = %precondition.key,
                    expected = ?precondition.expected,
                    actual = ?current,
                    "Precondition failed"
                );
                // dropping `tx` rolls back
                return Err(StoreError::conflict(precondition.collection, precondition.key));
            }
        }

        let observed_absent: HashSet<(&str, Uuid)> = preconditions
            .iter()
            .filter(|p| p.expected.is_none())
            .map(|p| (p.collection, p.key))
            .collect();

        for mutation in &mutations {
            let (collection, key) = mutation.target();
            let result = match mutation {
                Mutation::Put { body, .. } if observed_absent.contains(&(collection, key)) => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, key, version, body)
                        VALUES ($1, $2, nextval('document_versions'), $3)
                        "#,
                    )
                    .bind(collection)
                    .bind(key)
                    .bind(body)
                    .execute(&mut *tx)
                    .await
                }
                Mutation::Put { body, .. } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, key, version, body)
                        VALUES ($1, $2, nextval('document_versions'), $3)
                        ON CONFLICT (collection, key) DO UPDATE
                        SET version = EXCLUDED.version,
                            body = EXCLUDED.body,
                            updated_at = now()
                        "#,
                    )
                    .bind(collection)
                    .bind(key)
                    .bind(body)
                    .execute(&mut *tx)
                    .await
                }
                Mutation::Delete { .. } => {
                    sqlx::query(
                        r#"
                        DELETE FROM documents
                        WHERE collection = $1 AND key = $2
                        "#,
                    )
                    .bind(collection)
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                }
            };
            result.map_err(|e| classify(e, collection, key))?;
        }

        let first_target = mutations.first().map(Mutation::target);
        tx.commit().await.map_err(|e| match first_target {
            Some((collection, key)) if is_conflict(&e) => StoreError::conflict(collection, key),
            _ => {
                tracing::error!(error = %e, "Commit outcome unknown");
                StoreError::CommitOutcomeUnknown(e.to_string())
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
