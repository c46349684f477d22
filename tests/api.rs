use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use minima::server::router;
use minima::service::{Service, ServiceConfig};

fn app() -> Router {
    router(Arc::new(Service::new(ServiceConfig::default())))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = serde_json::from_slice(&bytes).context("response is not JSON")?;
    Ok((status, value))
}

async fn post(app: &Router, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
    send(app, "POST", uri, Some(body)).await
}

#[tokio::test]
async fn hello_world_suspends_and_resumes() -> Result<()> {
    let app = app();
    let (status, first) = post(
        &app,
        "/executeCode",
        json!({ "code": "var x = get(); show(\"Hello \" + x);" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["waitingForInput"], true);
    assert_eq!(first["inputPrompt"], "Enter input:");
    assert!(first["formattedTAC"].as_str().unwrap().starts_with("0: INPUT t1"));
    let id = first["executionId"].as_str().unwrap().to_string();

    let (status, second) = post(
        &app,
        "/executeCode",
        json!({ "executionId": id, "userInput": "World" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], true);
    assert_eq!(second["output"], "Hello World");
    assert_eq!(second["waitingForInput"], false);
    assert!(second.get("executionId").is_none());
    Ok(())
}

#[tokio::test]
async fn two_inputs_keep_their_order() -> Result<()> {
    let app = app();
    let code = "show(\"start\"); var a = get(\"a?\"); show(a); var b = get(\"b?\"); show(b); show(\"end\");";
    let (_, first) = post(&app, "/executeCode", json!({ "code": code })).await?;
    assert_eq!(first["output"], "start");
    assert_eq!(first["inputPrompt"], "a?");
    let id = first["executionId"].clone();

    let (_, second) = post(&app, "/executeCode", json!({ "executionId": id, "userInput": "one" })).await?;
    assert_eq!(second["output"], "one");
    assert_eq!(second["waitingForInput"], true);
    assert_eq!(second["inputPrompt"], "b?");
    assert_eq!(second["executionId"], id);

    let (_, third) = post(&app, "/executeCode", json!({ "executionId": id, "userInput": "two" })).await?;
    assert_eq!(third["output"], "two\nend");
    assert_eq!(third["waitingForInput"], false);
    Ok(())
}

#[tokio::test]
async fn unknown_execution_is_a_client_error() -> Result<()> {
    let (status, body) = post(
        &app(),
        "/executeCode",
        json!({ "executionId": "does-not-exist", "userInput": "1" }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No active execution with id does-not-exist");
    Ok(())
}

#[tokio::test]
async fn programs_with_diagnostics_are_not_executed() -> Result<()> {
    let (status, body) = post(&app(), "/executeCode", json!({ "code": "show(x);" })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Cannot execute: 0 lexical, 0 syntax and 1 semantic error(s)")
    );
    assert!(body.get("formattedTAC").is_none());
    Ok(())
}

#[tokio::test]
async fn requests_without_code_or_id_are_rejected() -> Result<()> {
    let (status, body) = post(&app(), "/executeCode", json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn analysis_is_idempotent_and_categorized() -> Result<()> {
    let app = app();
    let request = json!({ "code": "var a = 1;\nshow(a\nvar b = $;" });
    let (status, first) = post(&app, "/analyzeFull", request.clone()).await?;
    let (_, second) = post(&app, "/analyzeFull", request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);

    assert_eq!(first["lexicalErrors"].as_array().unwrap().len(), 1);
    assert_eq!(first["lexicalErrors"][0]["type"], "lexical");
    assert_eq!(first["lexicalErrors"][0]["category"], "Invalid Symbol");
    let syntax = &first["syntaxErrors"][0];
    assert_eq!(syntax["type"], "syntax");
    assert_eq!(syntax["line"], 3);
    assert!(syntax["symbols"].as_array().unwrap().iter().any(|symbol| symbol == ")"));
    assert_eq!(first["semanticErrors"], json!([]));
    assert_eq!(first["tokens"][0], json!({ "type": "VAR", "value": "var", "line": 1, "column": 1 }));
    Ok(())
}

#[tokio::test]
async fn ast_and_symbol_table() -> Result<()> {
    let app = app();
    let (_, ast) = post(&app, "/getAST", json!({ "code": "show(1);" })).await?;
    assert_eq!(ast["success"], true);
    assert_eq!(ast["ast"]["name"], "Program");

    let (_, broken) = post(&app, "/getAST", json!({ "code": "show(1" })).await?;
    assert_eq!(broken["success"], false);

    let (_, table) = post(
        &app,
        "/getSymbolTable",
        json!({ "code": "func twice(n) { throw n * 2; }", "includeBuiltins": true }),
    )
    .await?;
    assert_eq!(table["success"], true);
    let symbols = table["symbols"].as_array().unwrap();
    assert_eq!(symbols[0]["name"], "twice");
    assert_eq!(symbols[0]["kind"], "function");
    assert_eq!(symbols[1]["isParameter"], true);
    assert!(symbols.iter().any(|symbol| symbol["scope"] == "builtin"));
    Ok(())
}

#[tokio::test]
async fn lists_builtin_function_names() -> Result<()> {
    let (status, body) = send(&app(), "GET", "/api/builtin-functions", None).await?;
    assert_eq!(status, StatusCode::OK);
    let names = body.as_array().unwrap();
    assert_eq!(names.len(), 23);
    assert_eq!(names[0], "length");
    assert!(names.iter().any(|name| name == "toList"));
    Ok(())
}
