use std::error::Error;
use std::sync::Arc;

use may_minihttp::HttpServer;
use tracing_subscriber::EnvFilter;

use stockroom::backend::memory::MemoryBackend;
use stockroom::backend::postgres::PgBackend;
use stockroom::backend::CatalogBackend;
use stockroom::catalog::{Catalog, RelationName};
use stockroom::config::{AppConfig, BackendKind};
use stockroom::http::CatalogService;
use stockroom::pool::DbPool;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        log::error!("stockroom exited with error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;

    may::config()
        .set_workers(config.server.workers.max(1))
        .set_stack_size(config.server.stack_size);

    let (backend, pg): (Arc<dyn CatalogBackend>, Option<Arc<PgBackend>>) =
        match config.catalog.backend {
            BackendKind::Postgres => {
                let schema = RelationName::from_config(&config.catalog.schema)?;
                let registry = RelationName::from_config(&config.catalog.registry_table)?;
                let states = RelationName::from_config(&config.catalog.states_table)?;
                let pool = DbPool::connect(&config.database)?;
                let pg = Arc::new(PgBackend::new(pool, schema, registry, states));
                let backend: Arc<dyn CatalogBackend> = pg.clone();
                (backend, Some(pg))
            }
            BackendKind::Memory => {
                log::warn!("Using the in-memory backend; data is lost on exit");
                let backend: Arc<dyn CatalogBackend> = Arc::new(MemoryBackend::new());
                (backend, None)
            }
        };

    let catalog = Catalog::new(backend);
    catalog.bootstrap()?;

    let server = HttpServer(CatalogService::new(catalog)).start(&config.server.bind)?;
    log::info!("Catalog service listening on {}", config.server.bind);
    let joined = server.join();

    if let Some(pg) = pg {
        pg.close();
    }
    joined.map_err(|e| format!("server thread panicked: {e:?}"))?;
    Ok(())
}
