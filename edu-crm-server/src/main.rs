use actix_web::{web, App, HttpServer};
use edu_crm::Store;

mod handlers;

/// Shared application state
pub struct AppState {
    pub store: Store,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    log::info!("Starting edu-crm server");

    let db_path = std::env::var("EDU_CRM_DB").unwrap_or_else(|_| "crm.db".to_string());
    let host = std::env::var("EDU_CRM_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("EDU_CRM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let store = Store::open(&db_path).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("failed to open store at {db_path}: {e}"),
        )
    })?;

    let state = web::Data::new(AppState { store });

    log::info!("Listening on {host}:{port}");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
