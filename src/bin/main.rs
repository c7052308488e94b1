use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use env_logger::Env;

use warbler::config::Config;
use warbler::core::db;
use warbler::{auth, configure_routes, handlers, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::new().default_filter_or("info"));

    let config = Config::from_env();
    let db = db::connect(&config)
        .await
        .context("could not open the database")?;

    if config.seed_demo_data {
        db::seed_demo_data(&db)
            .await
            .context("seeding demo data failed")?;
    }

    let purged = auth::purge_expired_sessions(&db, config.session_expiration_hours)
        .await
        .context("purging expired sessions failed")?;
    if purged > 0 {
        log::info!("purged {} expired sessions", purged);
    }

    let bind = (config.host.clone(), config.port);
    log::info!("Server listening on http://{}:{}", bind.0, bind.1);

    let data = web::Data::new(AppState { db, config });

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
            .default_service(web::to(handlers::not_found))
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
