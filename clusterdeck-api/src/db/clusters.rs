use chrono::{DateTime, Utc};
use clusterdeck_config::SerializableSecretString;
use secrecy::ExposeSecret;
use sqlx::{FromRow, PgExecutor};
use thiserror::Error;

use crate::configs::cluster::ClusterNetwork;
use crate::configs::serde::{
    DbDeserializationError, DbSerializationError, deserialize_from_value, serialize,
};

#[derive(Debug, Error)]
pub enum ClustersDbError {
    #[error("Error while interacting with Postgres for clusters: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Error while serializing cluster metadata: {0}")]
    DbSerialization(#[from] DbSerializationError),

    #[error("Error while deserializing cluster metadata: {0}")]
    DbDeserialization(#[from] DbDeserializationError),
}

/// Everything stored about a cluster apart from the generated columns.
#[derive(Debug, Clone)]
pub struct NewCluster {
    pub name: String,
    pub cn_name: String,
    pub cluster_type: String,
    pub api_server: String,
    /// Base64 encoded kubeconfig document.
    pub kube_config: SerializableSecretString,
    pub enabled: bool,
    pub version: String,
    pub region: String,
    pub zones: Vec<String>,
    pub subnets: Vec<String>,
    pub network: ClusterNetwork,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: i64,
    pub name: String,
    pub cn_name: String,
    pub cluster_type: String,
    pub api_server: String,
    pub kube_config: SerializableSecretString,
    pub enabled: bool,
    pub version: String,
    pub region: String,
    pub zones: Vec<String>,
    pub subnets: Vec<String>,
    pub network: ClusterNetwork,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter and window applied when listing clusters.
#[derive(Debug, Clone, Default)]
pub struct ClusterFilter {
    pub cluster_type: Option<String>,
    pub region: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ClusterFilter {
    pub fn matches(&self, cluster: &Cluster) -> bool {
        self.cluster_type
            .as_ref()
            .is_none_or(|cluster_type| &cluster.cluster_type == cluster_type)
            && self
                .region
                .as_ref()
                .is_none_or(|region| &cluster.region == region)
    }
}

#[derive(FromRow)]
struct ClusterRow {
    id: i64,
    name: String,
    cn_name: String,
    cluster_type: String,
    api_server: String,
    kube_config: String,
    enabled: bool,
    version: String,
    region: String,
    zones: serde_json::Value,
    subnets: serde_json::Value,
    network: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ClusterRow> for Cluster {
    type Error = ClustersDbError;

    fn try_from(row: ClusterRow) -> Result<Self, Self::Error> {
        Ok(Cluster {
            id: row.id,
            name: row.name,
            cn_name: row.cn_name,
            cluster_type: row.cluster_type,
            api_server: row.api_server,
            kube_config: row.kube_config.into(),
            enabled: row.enabled,
            version: row.version,
            region: row.region,
            zones: deserialize_from_value(row.zones)?,
            subnets: deserialize_from_value(row.subnets)?,
            network: deserialize_from_value(row.network)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const CLUSTER_COLUMNS: &str = "id, name, cn_name, cluster_type, api_server, kube_config, \
    enabled, version, region, zones, subnets, network, created_at, updated_at";

pub async fn create_cluster<'c, E>(executor: E, cluster: &NewCluster) -> Result<i64, ClustersDbError>
where
    E: PgExecutor<'c>,
{
    let zones = serialize(&cluster.zones)?;
    let subnets = serialize(&cluster.subnets)?;
    let network = serialize(&cluster.network)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        insert into app.clusters (
            name, cn_name, cluster_type, api_server, kube_config,
            enabled, version, region, zones, subnets, network
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        returning id
        "#,
    )
    .bind(&cluster.name)
    .bind(&cluster.cn_name)
    .bind(&cluster.cluster_type)
    .bind(&cluster.api_server)
    .bind(cluster.kube_config.expose_secret())
    .bind(cluster.enabled)
    .bind(&cluster.version)
    .bind(&cluster.region)
    .bind(zones)
    .bind(subnets)
    .bind(network)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

pub async fn read_cluster<'c, E>(executor: E, cluster_id: i64) -> Result<Option<Cluster>, ClustersDbError>
where
    E: PgExecutor<'c>,
{
    let row: Option<ClusterRow> = sqlx::query_as(&format!(
        "select {CLUSTER_COLUMNS} from app.clusters where id = $1"
    ))
    .bind(cluster_id)
    .fetch_optional(executor)
    .await?;

    row.map(Cluster::try_from).transpose()
}

pub async fn update_cluster<'c, E>(
    executor: E,
    cluster_id: i64,
    cluster: &NewCluster,
) -> Result<Option<i64>, ClustersDbError>
where
    E: PgExecutor<'c>,
{
    let zones = serialize(&cluster.zones)?;
    let subnets = serialize(&cluster.subnets)?;
    let network = serialize(&cluster.network)?;

    let id: Option<i64> = sqlx::query_scalar(
        r#"
        update app.clusters
        set name = $1, cn_name = $2, cluster_type = $3, api_server = $4,
            kube_config = $5, enabled = $6, version = $7, region = $8,
            zones = $9, subnets = $10, network = $11, updated_at = now()
        where id = $12
        returning id
        "#,
    )
    .bind(&cluster.name)
    .bind(&cluster.cn_name)
    .bind(&cluster.cluster_type)
    .bind(&cluster.api_server)
    .bind(cluster.kube_config.expose_secret())
    .bind(cluster.enabled)
    .bind(&cluster.version)
    .bind(&cluster.region)
    .bind(zones)
    .bind(subnets)
    .bind(network)
    .bind(cluster_id)
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

pub async fn delete_cluster<'c, E>(executor: E, cluster_id: i64) -> Result<Option<i64>, ClustersDbError>
where
    E: PgExecutor<'c>,
{
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        delete from app.clusters
        where id = $1
        returning id
        "#,
    )
    .bind(cluster_id)
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

pub async fn read_clusters<'c, E>(executor: E, filter: &ClusterFilter) -> Result<Vec<Cluster>, ClustersDbError>
where
    E: PgExecutor<'c>,
{
    let rows: Vec<ClusterRow> = sqlx::query_as(&format!(
        r#"
        select {CLUSTER_COLUMNS}
        from app.clusters
        where ($1::text is null or cluster_type = $1)
          and ($2::text is null or region = $2)
        order by id
        limit $3 offset $4
        "#
    ))
    .bind(filter.cluster_type.as_deref())
    .bind(filter.region.as_deref())
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(Cluster::try_from).collect()
}

pub async fn count_clusters<'c, E>(executor: E, filter: &ClusterFilter) -> Result<i64, ClustersDbError>
where
    E: PgExecutor<'c>,
{
    let count: i64 = sqlx::query_scalar(
        r#"
        select count(*)
        from app.clusters
        where ($1::text is null or cluster_type = $1)
          and ($2::text is null or region = $2)
        "#,
    )
    .bind(filter.cluster_type.as_deref())
    .bind(filter.region.as_deref())
    .fetch_one(executor)
    .await?;

    Ok(count)
}
