mod common;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{read, register, send, spawn_fake, test_app};

const BOUNDARY: &str = "teamdesk-test-boundary";

/// Builds a multipart body with an optional `type` field and an optional file.
fn multipart_body(kind: Option<&str>, file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(kind) = kind {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"type\"\r\n\r\n{}\r\n",
                BOUNDARY, kind
            )
            .as_bytes(),
        );
    }
    if let Some((filename, contents)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload(app: &Router, token: &str, kind: Option<&str>, file: Option<(&str, &[u8])>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/batch-upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(kind, file)))
        .unwrap();
    read(app.clone().oneshot(request).await.unwrap()).await
}

#[tokio::test]
async fn test_consultant_upload_creates_rows() {
    let (app, _) = test_app().await;
    let token = register(&app, "batch@acme.test").await;

    let csv = "name,level,skills,salary\nAda,junior,\"strategy, pricing\",55000\nBob,Manager,ops,90000\n\n";
    let (status, body) = upload(&app, &token, Some("consultants"), Some(("team.csv", csv.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", body);
    assert_eq!(body["created"], 2);

    let (_, consultants) = send(&app, Method::GET, "/api/workforce", Some(&token), None).await;
    let consultants = consultants.as_array().unwrap();
    assert_eq!(consultants.len(), 2);
    let bob = consultants.iter().find(|c| c["name"] == "Bob").unwrap();
    assert_eq!(bob["level"], "manager");
    let ada = consultants.iter().find(|c| c["name"] == "Ada").unwrap();
    assert_eq!(ada["skills"], serde_json::json!(["strategy", "pricing"]));

    let (status, body) = upload(&app, &token, Some("consultants"), Some(("again.csv", csv.as_bytes()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_project_upload_normalizes_status() {
    let (app, _) = test_app().await;
    let token = register(&app, "projects-batch@acme.test").await;

    let csv = "name,client,requiredSkills,startDate,endDate,teamSize.junior,teamSize.manager,teamSize.partner,status,chanceToClose\n\
               Alpha,Globex,strategy,2025-01-01,2025-03-31,2,1,0.5, started ,\n\
               Beta,Initech,ops,02/01/2025,2025/04/30,,,,discussions,40\n";
    let (status, body) = upload(&app, &token, Some("projects"), Some(("projects.csv", csv.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", body);
    assert_eq!(body["created"], 2);

    let (_, projects) = send(&app, Method::GET, "/api/projects", Some(&token), None).await;
    let projects = projects.as_array().unwrap();
    assert_eq!(projects[0]["name"], "Alpha");
    assert_eq!(projects[0]["status"], "Started");
    assert_eq!(projects[1]["startDate"], "2025-02-01");
    assert_eq!(projects[1]["chanceToClose"], 40);
}

#[tokio::test]
async fn test_missing_header_is_reported() {
    let (app, _) = test_app().await;
    let token = register(&app, "headers@acme.test").await;

    let csv = "name,level,skills\nAda,junior,strategy\n";
    let (status, body) = upload(&app, &token, Some("consultants"), Some(("team.csv", csv.as_bytes()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required columns");
    assert!(body["details"].as_str().unwrap().contains("salary"));
}

#[tokio::test]
async fn test_row_errors_use_spreadsheet_numbering() {
    let (app, _) = test_app().await;
    let token = register(&app, "rows@acme.test").await;

    let csv = "name,level,skills,salary\nAda,junior,strategy,50000\nBob,wizard,ops,abc\n";
    let (status, body) = upload(&app, &token, Some("consultants"), Some(("team.csv", csv.as_bytes()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e["row"] == 3));
    assert!(errors.iter().any(|e| e["field"] == "level"));
    assert!(errors.iter().any(|e| e["field"] == "salary"));

    let (_, consultants) = send(&app, Method::GET, "/api/workforce", Some(&token), None).await;
    assert!(consultants.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_rejections() {
    let (app, _) = test_app().await;
    let token = register(&app, "reject@acme.test").await;

    let (status, body) = upload(&app, &token, Some("consultants"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file provided");

    let (status, body) = upload(&app, &token, Some("invoices"), Some(("x.csv", "name\nA\n".as_bytes()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid type");

    let (status, body) = upload(&app, &token, Some("consultants"), Some(("team.pdf", "binary".as_bytes()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported file format");

    let (status, body) = upload(&app, &token, Some("consultants"), Some(("team.xlsx", "binary".as_bytes()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid file format"));

    let (status, body) = upload(&app, &token, Some("consultants"), Some(("empty.csv", "name,level,skills,salary\n".as_bytes()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "The file is empty. Please add some data.");
}

#[tokio::test]
async fn test_upload_respects_free_plan_limit() {
    let (app, _) = test_app().await;
    let token = register(&app, "batch-limit@acme.test").await;

    let mut csv = String::from("name,level,skills,salary\n");
    for i in 0..11 {
        csv.push_str(&format!("Consultant {},junior,strategy,40000\n", i));
    }
    let (status, body) = upload(&app, &token, Some("consultants"), Some(("team.csv", csv.as_bytes()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().starts_with("Free plan is limited to 10 consultants"));
}

#[tokio::test]
async fn test_excel_upload_creates_rows() {
    let (app, _) = test_app().await;
    let token = register(&app, "excel@acme.test").await;

    let workbook: &[u8] = include_bytes!("fixtures/consultants.xlsx");
    let (status, body) = upload(&app, &token, Some("consultants"), Some(("team.xlsx", workbook))).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", body);
    assert_eq!(body["created"], 2);

    let (_, consultants) = send(&app, Method::GET, "/api/workforce", Some(&token), None).await;
    let ada = consultants.as_array().unwrap().iter().find(|c| c["name"] == "Ada").unwrap().clone();
    assert_eq!(ada["level"], "junior");
    assert_eq!(ada["salary"], 55000.0);

    let projects: &[u8] = include_bytes!("fixtures/projects.xlsx");
    let (status, body) = upload(&app, &token, Some("projects"), Some(("projects.xlsx", projects))).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", body);
    let (_, projects) = send(&app, Method::GET, "/api/projects", Some(&token), None).await;
    let alpha = projects.as_array().unwrap().iter().find(|p| p["name"] == "Alpha").unwrap().clone();
    assert_eq!(alpha["startDate"], "2025-01-01");
    assert_eq!(alpha["status"], "Started");

    let invalid: &[u8] = include_bytes!("fixtures/consultants_invalid.xlsx");
    let (status, body) = upload(&app, &token, Some("consultants"), Some(("bad.xlsx", invalid))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].as_array().unwrap().iter().all(|e| e["row"] == 3));
}

const SAP_KEY: &str = "sap-key";

fn sap_authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(SAP_KEY)
}

/// Resources in the OData v2 envelope, projects as a bare array.
fn fake_sap() -> Router {
    Router::new()
        .route(
            "/s4hanacloud/sap/opu/odata/sap/API_PROJECTDEMAND/A_ProjDmndResourceAssignment",
            get(|headers: HeaderMap| async move {
                if !sap_authorized(&headers) {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
                }
                (
                    StatusCode::OK,
                    Json(json!({ "d": { "results": [
                        { "fullName": "Ada", "jobGrade": "P3", "annualCost": "90000.00",
                          "qualifications": [{ "name": "Pricing" }, { "name": "SQL" }] },
                        { "fullName": "Bob", "jobGrade": "P1", "annualCost": 50000 }
                    ] } })),
                )
            }),
        )
        .route(
            "/s4hanacloud/sap/opu/odata/sap/API_ENTERPRISE_PROJECT/Projects",
            get(|headers: HeaderMap| async move {
                if !sap_authorized(&headers) {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
                }
                (
                    StatusCode::OK,
                    Json(json!([{
                        "projectName": "Alpha",
                        "customerName": "Acme",
                        "startDate": "/Date(1735689600000)/",
                        "endDate": "2025-06-30T00:00:00",
                        "projectStatus": "E0003",
                        "staffingPlan": { "junior": 2, "manager": 1 }
                    }])),
                )
            }),
        )
}

#[tokio::test]
async fn test_sap_import_previews_then_stores() {
    let sap_url = spawn_fake(fake_sap()).await;
    let (app, _) = test_app().await;
    let token = register(&app, "sap@acme.test").await;
    let request = |action: &str, key: &str| json!({ "action": action, "config": { "baseUrl": sap_url, "apiKey": key } });

    let (status, body) = send(&app, Method::POST, "/api/integrations/sap/import", Some(&token), Some(request("sync", SAP_KEY))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid action");

    let (status, _) = send(&app, Method::POST, "/api/integrations/sap/import", Some(&token), Some(request("import", "wrong"))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, body) = send(&app, Method::POST, "/api/integrations/sap/import", Some(&token), Some(request("preview", SAP_KEY))).await;
    assert_eq!(status, StatusCode::OK, "preview failed: {}", body);
    assert_eq!(body["consultants"].as_array().unwrap().len(), 2);
    assert_eq!(body["consultants"][0]["level"], "manager");
    assert_eq!(body["projects"][0]["status"], "Started");
    assert_eq!(body["projects"][0]["startDate"], "2025-01-01");
    let (_, consultants) = send(&app, Method::GET, "/api/workforce", Some(&token), None).await;
    assert!(consultants.as_array().unwrap().is_empty(), "preview must not store anything");

    let (status, body) = send(&app, Method::POST, "/api/integrations/sap/import", Some(&token), Some(request("import", SAP_KEY))).await;
    assert_eq!(status, StatusCode::OK, "import failed: {}", body);
    assert_eq!(body["consultantsImported"], 2);
    assert_eq!(body["projectsImported"], 1);

    let (_, consultants) = send(&app, Method::GET, "/api/workforce", Some(&token), None).await;
    let ada = consultants.as_array().unwrap().iter().find(|c| c["name"] == "Ada").unwrap().clone();
    assert_eq!(ada["salary"], 90000.0);
    assert_eq!(ada["skills"], json!(["Pricing", "SQL"]));
    let (_, projects) = send(&app, Method::GET, "/api/projects", Some(&token), None).await;
    let alpha = &projects[0];
    assert_eq!(alpha["client"], "Acme");
    assert_eq!(alpha["chanceToClose"], 100);
    assert_eq!(alpha["teamSize"]["junior"], 2.0);

    let (status, body) = send(&app, Method::POST, "/api/integrations/sap/import", Some(&token), Some(request("import", SAP_KEY))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 2, "existing names are refused: {}", body);
}
