use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use sqlx::PgPool;

use crate::dal::company_db;
use crate::services::{RunRequest, RunRequestSender};

#[derive(Deserialize)]
pub struct RunLeadRequest {
    pub icp: String,
    pub country: String,
}

/// Queue a discovery run. Returns immediately; the background handler
/// picks the run up in arrival order.
#[post("/run")]
pub async fn queue_run(
    body: web::Json<RunLeadRequest>,
    sender: web::Data<RunRequestSender>,
) -> impl Responder {
    let icp = body.icp.trim();
    let country = body.country.trim();
    if icp.is_empty() || country.is_empty() {
        return HttpResponse::BadRequest().body("icp and country are required");
    }

    sender.send(RunRequest {
        icp: icp.to_string(),
        country: country.to_string(),
    });
    HttpResponse::Accepted().body("Pipeline run queued")
}

#[get("")]
pub async fn list_leads(pool: web::Data<PgPool>) -> impl Responder {
    match company_db::recent_companies(&pool, 100).await {
        Ok(companies) => HttpResponse::Ok().json(companies),
        Err(e) => {
            log::error!("Failed to list companies: {:?}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
