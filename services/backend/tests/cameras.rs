mod common;
mod http_helpers;

use axum::http::StatusCode;
use common::{
    AGENT_A_PUBLIC, AGENT_B_PRIVATE, AGENT_B_PUBLIC, TestApp, open_envelope, read_json,
    tenant_token, test_app,
};
use http_helpers::{bearer_json_request, bearer_request, json_request};
use tower::ServiceExt;

struct PairedAgent {
    id: String,
    token: String,
}

async fn pair_agent(app: &TestApp, admin: &str, name: &str, pem: &str) -> PairedAgent {
    let issued = read_json(
        app.clone()
            .oneshot(bearer_json_request(
                "POST",
                "/v1/agents/pair-codes",
                admin,
                serde_json::json!({ "agentName": name }),
            ))
            .await
            .expect("pair code"),
    )
    .await;
    let registered = read_json(
        app.clone()
            .oneshot(json_request(
                "POST",
                "/v1/agents/register",
                serde_json::json!({ "code": issued["code"], "publicKeyPem": pem }),
            ))
            .await
            .expect("register"),
    )
    .await;
    let exchanged = read_json(
        app.clone()
            .oneshot(json_request(
                "POST",
                "/v1/agents/token",
                serde_json::json!({
                    "agentId": registered["agentId"],
                    "refreshToken": registered["refreshToken"],
                }),
            ))
            .await
            .expect("token"),
    )
    .await;
    PairedAgent {
        id: registered["agentId"].as_str().expect("agentId").to_string(),
        token: exchanged["accessToken"].as_str().expect("accessToken").to_string(),
    }
}

async fn patch(app: &TestApp, admin: &str, camera_id: &str, body: serde_json::Value) -> axum::response::Response {
    app.clone()
        .oneshot(bearer_json_request(
            "PATCH",
            &format!("/v1/cameras/{camera_id}"),
            admin,
            body,
        ))
        .await
        .expect("patch")
}

async fn feed(app: &TestApp, agent: &PairedAgent) -> Vec<serde_json::Value> {
    let response = app
        .clone()
        .oneshot(bearer_request(
            "GET",
            &format!("/v1/agents/{}/cameras", agent.id),
            &agent.token,
        ))
        .await
        .expect("feed");
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await.as_array().expect("array").clone()
}

#[tokio::test]
async fn direct_camera_crud() {
    let (app, state) = test_app();
    let admin = tenant_token(&state, "T1");

    let response = app
        .clone()
        .oneshot(bearer_json_request(
            "POST",
            "/v1/cameras",
            &admin,
            serde_json::json!({ "id": "lobby", "name": "Lobby", "rtspUrl": "rtsp://10.0.0.5/lobby" }),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["rtspUrl"], "rtsp://10.0.0.5/lobby");
    assert!(created["relayAgentId"].is_null());
    assert_eq!(created["sendWidth"], 640);
    assert_eq!(created["jpegQuality"], 70);

    let response = app
        .clone()
        .oneshot(bearer_json_request(
            "POST",
            "/v1/cameras",
            &admin,
            serde_json::json!({ "id": "lobby", "name": "Lobby 2", "rtspUrl": "rtsp://10.0.0.6/" }),
        ))
        .await
        .expect("duplicate");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = patch(
        &app,
        &admin,
        "lobby",
        serde_json::json!({ "name": "Main lobby", "isActive": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let patched = read_json(response).await;
    assert_eq!(patched["name"], "Main lobby");
    assert_eq!(patched["isActive"], true);
    assert_eq!(patched["rtspUrl"], "rtsp://10.0.0.5/lobby");

    let other = tenant_token(&state, "T2");
    let response = app
        .clone()
        .oneshot(bearer_request("GET", "/v1/cameras/lobby", &other))
        .await
        .expect("foreign get");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(bearer_request("DELETE", "/v1/cameras/lobby", &admin))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(bearer_request("GET", "/v1/cameras/lobby", &admin))
        .await
        .expect("get deleted");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_requires_rtsp_url() {
    let (app, state) = test_app();
    let admin = tenant_token(&state, "T1");
    let response = app
        .oneshot(bearer_json_request(
            "POST",
            "/v1/cameras",
            &admin,
            serde_json::json!({ "name": "Lobby" }),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "validation_error");
}

#[tokio::test]
async fn relay_transitions_follow_the_agent() {
    let (app, state) = test_app();
    let admin = tenant_token(&state, "T1");
    let agent_a = pair_agent(&app, &admin, "Gate-A", AGENT_A_PUBLIC).await;
    let agent_b = pair_agent(&app, &admin, "Gate-B", AGENT_B_PUBLIC).await;

    let response = app
        .clone()
        .oneshot(bearer_json_request(
            "POST",
            "/v1/cameras",
            &admin,
            serde_json::json!({ "id": "gate", "name": "Gate", "rtspUrl": "rtsp://10.0.0.5/gate" }),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::CREATED);

    // Direct -> Relayed needs the URL in the request.
    let response = patch(&app, &admin, "gate", serde_json::json!({ "relayAgentId": agent_a.id })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = patch(
        &app,
        &admin,
        "gate",
        serde_json::json!({ "relayAgentId": agent_a.id, "rtspUrl": "rtsp://10.0.0.5/gate" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let relayed = read_json(response).await;
    assert_eq!(relayed["rtspUrl"], "relay://cameras/gate");
    assert_eq!(relayed["relayAgentId"], agent_a.id.as_str());
    assert_eq!(feed(&app, &agent_a).await.len(), 1);

    let response = patch(&app, &admin, "gate", serde_json::json!({ "relayAgentId": agent_b.id })).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json(response).await["code"], "missing_plaintext");
    assert_eq!(feed(&app, &agent_a).await.len(), 1);

    let response = patch(
        &app,
        &admin,
        "gate",
        serde_json::json!({ "relayAgentId": agent_b.id, "rtspUrl": "rtsp://10.0.0.9/gate" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(feed(&app, &agent_a).await.is_empty());
    let feed_b = feed(&app, &agent_b).await;
    assert_eq!(feed_b.len(), 1);
    assert_eq!(
        open_envelope(AGENT_B_PRIVATE, &feed_b[0]["rtspUrlEnc"]).expect("open"),
        "rtsp://10.0.0.9/gate"
    );

    let response = patch(&app, &admin, "gate", serde_json::json!({ "relayAgentId": null })).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = patch(
        &app,
        &admin,
        "gate",
        serde_json::json!({ "relayAgentId": null, "rtspUrl": "rtsp://10.0.0.9/direct" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let direct = read_json(response).await;
    assert_eq!(direct["rtspUrl"], "rtsp://10.0.0.9/direct");
    assert!(direct["relayAgentId"].is_null());
    assert!(feed(&app, &agent_b).await.is_empty());
}

#[tokio::test]
async fn foreign_agent_cannot_be_assigned() {
    let (app, state) = test_app();
    let other_admin = tenant_token(&state, "T2");
    let foreign = pair_agent(&app, &other_admin, "Other", AGENT_A_PUBLIC).await;

    let admin = tenant_token(&state, "T1");
    let response = app
        .oneshot(bearer_json_request(
            "POST",
            "/v1/cameras",
            &admin,
            serde_json::json!({
                "id": "gate",
                "name": "Gate",
                "rtspUrl": "rtsp://10.0.0.5/gate",
                "relayAgentId": foreign.id,
            }),
        ))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
