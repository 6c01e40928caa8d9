use actix_web::{web, HttpResponse};
use edu_crm::CrmError;
use std::collections::HashMap;

use crate::AppState;

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/status", web::get().to(status))
            .route("/schema", web::get().to(schema))
            .route("/{table}", web::get().to(list_records))
            .route("/{table}", web::post().to(create_record))
            .route("/{table}/{id}", web::get().to(get_record))
            .route("/{table}/{id}", web::put().to(update_record))
            .route("/{table}/{id}", web::patch().to(patch_record))
            .route("/{table}/{id}", web::delete().to(delete_record))
            .route("/{table}/{id}/delete-plan", web::get().to(delete_plan)),
    );
}

// ── Helpers ─────────────────────────────────────────────────────────

fn ok_json(value: serde_json::Value) -> HttpResponse {
    HttpResponse::Ok().json(value)
}

fn created_json(value: serde_json::Value) -> HttpResponse {
    HttpResponse::Created().json(value)
}

fn err_response(e: CrmError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match &e {
        CrmError::NotFound { .. } | CrmError::UnknownTable(_) => {
            HttpResponse::NotFound().json(body)
        }
        CrmError::Validation(_) => HttpResponse::BadRequest().json(body),
        CrmError::UniqueViolation { .. } | CrmError::ReferentialIntegrity(_) => {
            HttpResponse::Conflict().json(body)
        }
        _ => {
            log::error!("Internal error: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            }))
        }
    }
}

fn respond(result: edu_crm::Result<serde_json::Value>) -> HttpResponse {
    match result {
        Ok(value) => ok_json(value),
        Err(e) => err_response(e),
    }
}

// ── Handlers ────────────────────────────────────────────────────────

async fn status(state: web::Data<AppState>) -> HttpResponse {
    respond(state.store.status())
}

async fn schema(state: web::Data<AppState>) -> HttpResponse {
    respond(serde_json::to_value(state.store.schema()).map_err(CrmError::from))
}

async fn list_records(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    respond(state.store.list_dynamic(&path, &query))
}

async fn create_record(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    match state.store.insert_dynamic(&path, body.into_inner()) {
        Ok(record) => created_json(record),
        Err(e) => err_response(e),
    }
}

async fn get_record(state: web::Data<AppState>, path: web::Path<(String, i64)>) -> HttpResponse {
    let (table, id) = path.into_inner();
    respond(state.store.get_dynamic(&table, id))
}

async fn update_record(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    let (table, id) = path.into_inner();
    respond(state.store.update_dynamic(&table, id, body.into_inner()))
}

async fn patch_record(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    let (table, id) = path.into_inner();
    respond(state.store.update_partial_dynamic(&table, id, body.into_inner()))
}

async fn delete_record(state: web::Data<AppState>, path: web::Path<(String, i64)>) -> HttpResponse {
    let (table, id) = path.into_inner();
    respond(state.store.delete_dynamic(&table, id))
}

async fn delete_plan(state: web::Data<AppState>, path: web::Path<(String, i64)>) -> HttpResponse {
    let (table, id) = path.into_inner();
    respond(state.store.delete_plan_dynamic(&table, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use edu_crm::Store;
    use serde_json::{json, Value};

    fn state() -> web::Data<AppState> {
        web::Data::new(AppState {
            store: Store::open_in_memory().unwrap(),
        })
    }

    #[actix_web::test]
    async fn test_status_and_schema() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["tables"]["payment"]["db_table"], json!("crm_payment"));

        let req = test::TestRequest::get().uri("/api/schema").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["tables"]["class_list"]["fields"]["start_date"]["column"], json!("start_data"));
    }

    #[actix_web::test]
    async fn test_create_get_and_conflict() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/role")
            .set_json(json!({ "name": "sales" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["display"], json!("sales"));
        let id = created["id"].as_i64().unwrap();

        let req = test::TestRequest::get()
            .uri(&format!("/api/role/{id}"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["name"], json!("sales"));

        let req = test::TestRequest::post()
            .uri("/api/role")
            .set_json(json!({ "name": "sales" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/invoice").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/tag/5").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/api/course")
            .set_json(json!({ "name": "Go", "price": -1, "period": 2, "outline": "-" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/payment")
            .set_json(json!({ "customer": 1, "course": 1, "consultant": 1 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_update_filter_and_delete() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        for name in ["North", "South"] {
            let req = test::TestRequest::post()
                .uri("/api/branch")
                .set_json(json!({ "name": name, "addr": "Main St" }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let req = test::TestRequest::patch()
            .uri("/api/branch/2")
            .set_json(json!({ "addr": "Harbour Rd" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["addr"], json!("Harbour Rd"));
        assert_eq!(body["name"], json!("South"));

        let req = test::TestRequest::put()
            .uri("/api/branch/1")
            .set_json(json!({ "name": "North Campus", "addr": "Main St" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["display"], json!("North Campus"));

        let req = test::TestRequest::get().uri("/api/branch/2").to_request();
        let mut fetched: Value = test::call_and_read_body_json(&app, req).await;
        fetched["name"] = json!("South Campus");
        let req = test::TestRequest::put()
            .uri("/api/branch/2")
            .set_json(fetched)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["display"], json!("South Campus"));

        let req = test::TestRequest::get()
            .uri("/api/branch?addr=Harbour%20Rd")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let req = test::TestRequest::get()
            .uri("/api/branch/1/delete-plan")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["deleted"], json!([{ "table": "branch", "id": 1 }]));

        let req = test::TestRequest::delete().uri("/api/branch/1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/branch").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }
}
