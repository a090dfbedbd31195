use actix_web::web;

mod health;
mod status;

pub use status::StatusState;

/// Register every status-server route
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health_route)
        .service(status::status_route)
        .service(status::target_summary_route);
}
