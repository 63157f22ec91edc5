use actix_web::{get, web, HttpResponse, Responder};
use askama::Template;
use sqlx::PgPool;

use crate::dal::stat_db::{self, PipelineRunRow};

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    company_count: i64,
    contact_count: i64,
    runs: Vec<PipelineRunRow>,
}

#[get("/dashboard")]
pub async fn dashboard(pool: web::Data<PgPool>) -> impl Responder {
    let data = tokio::try_join!(
        stat_db::company_count(&pool),
        stat_db::contact_count(&pool),
        stat_db::recent_runs(&pool, 20),
    );
    let (company_count, contact_count, runs) = match data {
        Ok(data) => data,
        Err(e) => {
            log::error!("Failed to load dashboard data: {:?}", e);
            return HttpResponse::InternalServerError().finish();
        }
    };

    let template = DashboardTemplate {
        company_count,
        contact_count,
        runs,
    };
    match template.render() {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => {
            log::error!("Failed to render dashboard: {:?}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
