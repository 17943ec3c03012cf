use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor};
use thiserror::Error;

use crate::configs::serde::{
    DbDeserializationError, DbSerializationError, deserialize_from_value, serialize,
};
use crate::configs::workload::{Containers, InvalidWorkloadKind, StringMap, WorkloadKind, WorkloadStatus};

#[derive(Debug, Error)]
pub enum WorkloadsDbError {
    #[error("Error while interacting with Postgres for workloads: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Error while serializing workload data: {0}")]
    DbSerialization(#[from] DbSerializationError),

    #[error("Error while deserializing workload data: {0}")]
    DbDeserialization(#[from] DbDeserializationError),

    #[error("A stored workload has an invalid kind: {0}")]
    InvalidKind(#[from] InvalidWorkloadKind),
}

/// Identifies a workload inside the store. Mirrors the identity of the
/// remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadKey {
    pub cluster_id: i64,
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}/{} in cluster {}",
            self.kind, self.namespace, self.name, self.cluster_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkload {
    pub key: WorkloadKey,
    pub replicas: i32,
    pub containers: Containers,
    pub labels: StringMap,
    pub annotations: StringMap,
    pub status: WorkloadStatus,
}

#[derive(Debug, Clone)]
pub struct Workload {
    pub id: i64,
    pub key: WorkloadKey,
    pub replicas: i32,
    pub containers: Containers,
    pub labels: StringMap,
    pub annotations: StringMap,
    pub status: WorkloadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadFilter {
    pub kind: Option<WorkloadKind>,
    pub namespace: Option<String>,
}

impl WorkloadFilter {
    pub fn matches(&self, key: &WorkloadKey) -> bool {
        self.kind.is_none_or(|kind| key.kind == kind)
            && self
                .namespace
                .as_ref()
                .is_none_or(|namespace| &key.namespace == namespace)
    }
}

#[derive(FromRow)]
struct WorkloadRow {
    id: i64,
    cluster_id: i64,
    kind: String,
    namespace: String,
    name: String,
    replicas: i32,
    containers: serde_json::Value,
    labels: serde_json::Value,
    annotations: serde_json::Value,
    status: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WorkloadRow> for Workload {
    type Error = WorkloadsDbError;

    fn try_from(row: WorkloadRow) -> Result<Self, Self::Error> {
        Ok(Workload {
            id: row.id,
            key: WorkloadKey {
                cluster_id: row.cluster_id,
                kind: row.kind.parse()?,
                namespace: row.namespace,
                name: row.name,
            },
            replicas: row.replicas,
            containers: deserialize_from_value(row.containers)?,
            labels: deserialize_from_value(row.labels)?,
            annotations: deserialize_from_value(row.annotations)?,
            status: deserialize_from_value(row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const WORKLOAD_COLUMNS: &str = "id, cluster_id, kind, namespace, name, replicas, containers, \
    labels, annotations, status, created_at, updated_at";

pub async fn create_workload<'c, E>(
    executor: E,
    workload: &NewWorkload,
) -> Result<i64, WorkloadsDbError>
where
    E: PgExecutor<'c>,
{
    let containers = serialize(&workload.containers)?;
    let labels = serialize(&workload.labels)?;
    let annotations = serialize(&workload.annotations)?;
    let status = serialize(&workload.status)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        insert into app.workloads (
            cluster_id, kind, namespace, name, replicas,
            containers, labels, annotations, status
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        returning id
        "#,
    )
    .bind(workload.key.cluster_id)
    .bind(workload.key.kind.as_str())
    .bind(&workload.key.namespace)
    .bind(&workload.key.name)
    .bind(workload.replicas)
    .bind(containers)
    .bind(labels)
    .bind(annotations)
    .bind(status)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

pub async fn read_workload<'c, E>(
    executor: E,
    key: &WorkloadKey,
) -> Result<Option<Workload>, WorkloadsDbError>
where
    E: PgExecutor<'c>,
{
    let row: Option<WorkloadRow> = sqlx::query_as(&format!(
        r#"
        select {WORKLOAD_COLUMNS}
        from app.workloads
        where cluster_id = $1 and kind = $2 and namespace = $3 and name = $4
        "#
    ))
    .bind(key.cluster_id)
    .bind(key.kind.as_str())
    .bind(&key.namespace)
    .bind(&key.name)
    .fetch_optional(executor)
    .await?;

    row.map(Workload::try_from).transpose()
}

/// Overwrites the stored fields of the workload identified by
/// `workload.key`. Returns `None` when no such workload is stored.
pub async fn update_workload<'c, E>(
    executor: E,
    workload: &NewWorkload,
) -> Result<Option<i64>, WorkloadsDbError>
where
    E: PgExecutor<'c>,
{
    let containers = serialize(&workload.containers)?;
    let labels = serialize(&workload.labels)?;
    let annotations = serialize(&workload.annotations)?;
    let status = serialize(&workload.status)?;

    let id: Option<i64> = sqlx::query_scalar(
        r#"
        update app.workloads
        set replicas = $5, containers = $6, labels = $7, annotations = $8,
            status = $9, updated_at = now()
        where cluster_id = $1 and kind = $2 and namespace = $3 and name = $4
        returning id
        "#,
    )
    .bind(workload.key.cluster_id)
    .bind(workload.key.kind.as_str())
    .bind(&workload.key.namespace)
    .bind(&workload.key.name)
    .bind(workload.replicas)
    .bind(containers)
    .bind(labels)
    .bind(annotations)
    .bind(status)
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

pub async fn delete_workload<'c, E>(
    executor: E,
    key: &WorkloadKey,
) -> Result<Option<i64>, WorkloadsDbError>
where
    E: PgExecutor<'c>,
{
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        delete from app.workloads
        where cluster_id = $1 and kind = $2 and namespace = $3 and name = $4
        returning id
        "#,
    )
    .bind(key.cluster_id)
    .bind(key.kind.as_str())
    .bind(&key.namespace)
    .bind(&key.name)
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

pub async fn read_cluster_workloads<'c, E>(
    executor: E,
    cluster_id: i64,
    filter: &WorkloadFilter,
) -> Result<Vec<Workload>, WorkloadsDbError>
where
    E: PgExecutor<'c>,
{
    let rows: Vec<WorkloadRow> = sqlx::query_as(&format!(
        r#"
        select {WORKLOAD_COLUMNS}
        from app.workloads
        where cluster_id = $1
          and ($2::text is null or kind = $2)
          and ($3::text is null or namespace = $3)
        order by id
        "#
    ))
    .bind(cluster_id)
    .bind(filter.kind.map(|kind| kind.as_str()))
    .bind(filter.namespace.as_deref())
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(Workload::try_from).collect()
}
