//! Facial zone listing

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::domain::FacialZone;
use crate::AppState;

/// Response for listing zones
#[derive(Serialize)]
pub struct ZonesListResponse<'a> {
    pub success: bool,
    pub data: Vec<&'a FacialZone>,
    pub count: usize,
}

/// GET /api/v1/zones - List the zone table in declaration order
pub async fn list_zones(state: web::Data<AppState>) -> HttpResponse {
    let data: Vec<&FacialZone> = state.zones.iter().collect();
    HttpResponse::Ok().json(ZonesListResponse {
        success: true,
        count: data.len(),
        data,
    })
}
