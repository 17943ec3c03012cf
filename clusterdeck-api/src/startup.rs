use std::{net::TcpListener, sync::Arc};

use actix_web::{App, HttpServer, dev::Server, web};
use actix_web_httpauth::middleware::HttpAuthentication;
use clusterdeck_config::shared::PgConnectionConfig;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::{
    authentication::auth_validator,
    config::ApiConfig,
    k8s::{http::KubeConnector, registry::ConnectionRegistry},
    metrics::init_metrics,
    routes::{
        clusters::{
            create_cluster, delete_cluster, read_all_clusters, read_cluster, read_cluster_events,
            read_cluster_metrics, read_cluster_pods, read_cluster_services, read_cluster_status,
            update_cluster,
        },
        health_check::health_check,
        json_error_handler,
        metrics::metrics,
        nodes::{
            delete_node_label, delete_node_taint, read_cluster_nodes, update_node_labels,
            update_node_taints,
        },
        path_error_handler, query_error_handler,
        workloads::{
            create_workload, delete_workload, read_all_workloads, read_workload, scale_workload,
            update_workload,
        },
    },
    services::{clusters::ClusterService, workloads::WorkloadService},
    span_builder::ApiRootSpanBuilder,
    store::{CredentialStore, postgres::PostgresStore},
};

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(config: ApiConfig) -> Result<Self, anyhow::Error> {
        config.validate()?;

        let connection_pool = get_connection_pool(&config.database);
        let store: Arc<dyn CredentialStore> = Arc::new(PostgresStore::new(connection_pool));
        let connector = Arc::new(KubeConnector::new(config.kube));
        let registry = Arc::new(ConnectionRegistry::new(connector));

        let listener = TcpListener::bind(config.application.to_string())?;
        let port = listener.local_addr()?.port();
        info!(address = %config.application, port, "starting api server");

        let server = run(config, listener, store, registry).await?;

        Ok(Self { port, server })
    }

    pub async fn migrate_database(config: PgConnectionConfig) -> Result<(), anyhow::Error> {
        let connection_pool = get_connection_pool(&config);

        sqlx::migrate!("./migrations").run(&connection_pool).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn get_connection_pool(config: &PgConnectionConfig) -> PgPool {
    PgPoolOptions::new().connect_lazy_with(config.with_db())
}

/// Starts the HTTP server on `listener`.
///
/// The store and the connection registry are injected so tests can run the
/// real routes against in-memory collaborators.
pub async fn run(
    config: ApiConfig,
    listener: TcpListener,
    store: Arc<dyn CredentialStore>,
    registry: Arc<ConnectionRegistry>,
) -> Result<Server, anyhow::Error> {
    let metrics_handle = init_metrics()?;

    let cluster_service = web::Data::new(ClusterService::new(store.clone(), registry.clone()));
    let workload_service = web::Data::new(WorkloadService::new(store, registry));
    let config = web::Data::new(config);

    let server = HttpServer::new(move || {
        let tracing_logger = TracingLogger::<ApiRootSpanBuilder>::new();
        let authentication = HttpAuthentication::bearer(auth_validator);
        App::new()
            .wrap(tracing_logger)
            .service(health_check)
            .service(metrics)
            .service(
                web::scope("v1")
                    .wrap(authentication)
                    //clusters
                    .service(create_cluster)
                    .service(read_all_clusters)
                    .service(read_cluster)
                    .service(update_cluster)
                    .service(delete_cluster)
                    .service(read_cluster_status)
                    .service(read_cluster_metrics)
                    .service(read_cluster_events)
                    .service(read_cluster_pods)
                    .service(read_cluster_services)
                    //nodes
                    .service(read_cluster_nodes)
                    .service(update_node_labels)
                    .service(delete_node_label)
                    .service(update_node_taints)
                    .service(delete_node_taint)
                    //workloads
                    .service(read_all_workloads)
                    .service(read_workload)
                    .service(create_workload)
                    .service(update_workload)
                    .service(delete_workload)
                    .service(scale_workload),
            )
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::PathConfig::default().error_handler(path_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .app_data(web::ThinData(metrics_handle.clone()))
            .app_data(config.clone())
            .app_data(cluster_service.clone())
            .app_data(workload_service.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
