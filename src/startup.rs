use std::net::TcpListener;

use actix_files::Files;
use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;

use crate::{
    routes::{dashboard_route, default_route, lead_route},
    services::RunRequestSender,
};

pub fn run(
    listener: TcpListener,
    db_pool: PgPool,
    run_sender: RunRequestSender,
) -> Result<Server, std::io::Error> {
    let db_pool = web::Data::new(db_pool);
    let run_sender = web::Data::new(run_sender);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .service(Files::new("/static", "./templates/static").prefer_utf8(true))
            .service(default_route::default)
            .service(
                web::scope("/lead")
                    .service(lead_route::queue_run)
                    .service(lead_route::list_leads),
            )
            .service(web::scope("/app").service(dashboard_route::dashboard))
            .app_data(db_pool.clone())
            .app_data(run_sender.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
