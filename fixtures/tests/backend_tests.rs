use fixtures::{spawn_server, BackendState, FixtureAccount};
use serde_json::Value;

async fn start(state: &BackendState) -> String {
    spawn_server(state.router()).await.unwrap()
}

#[tokio::test]
async fn test_auth_link_issues_ticket() {
    let state = BackendState::new();
    let base = start(&state).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/auth")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let json: Value = response.json().await.unwrap();
    let id = json["id"].as_str().unwrap();
    assert!(json["url"].as_str().unwrap().ends_with(id));
    assert_eq!(state.issued_tickets(), 1);
    assert_eq!(state.last_ticket_id().as_deref(), Some(id));
}

#[tokio::test]
async fn test_ticket_pending_then_redeemed() {
    let state = BackendState::new();
    state.register_account("tok", FixtureAccount::sample(3, "frank"));
    let base = start(&state).await;
    let client = reqwest::Client::new();

    let json: Value = client
        .get(format!("{base}/auth"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = json["id"].as_str().unwrap().to_string();

    let response = client
        .get(format!("{base}/auth/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    state.redeem(&id, "tok");
    let response = client
        .get(format!("{base}/auth/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["authToken"], "tok");
    assert_eq!(json["profile"]["fid"], 3);
    assert_eq!(json["profile"]["username"], "frank");
    assert_eq!(state.poll_count(&id), 2);
}

#[tokio::test]
async fn test_auto_redeem() {
    let state = BackendState::new().with_auto_redeem(2);
    let base = start(&state).await;
    let client = reqwest::Client::new();

    let json: Value = client
        .get(format!("{base}/auth"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = json["id"].as_str().unwrap().to_string();

    let first = client
        .get(format!("{base}/auth/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::NO_CONTENT);

    let second: Value = client
        .get(format!("{base}/auth/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = second["authToken"].as_str().unwrap();

    // The generated token is a working bearer
    let check = client
        .get(format!("{base}/auth/check"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(check.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn test_check_and_profile_require_bearer() {
    let state = BackendState::new();
    state.register_account("tok", FixtureAccount::sample(4, "gina"));
    let base = start(&state).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/auth/check"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "Invalid token\n");

    let json: Value = client
        .get(format!("{base}/profile"))
        .bearer_auth("tok")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["user"]["userID"], 4);
    assert_eq!(json["reputation"], 12);

    state.revoke("tok");
    let response = client
        .get(format!("{base}/profile"))
        .bearer_auth("tok")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_ticket_is_not_found() {
    let state = BackendState::new();
    let base = start(&state).await;

    let response = reqwest::get(format!("{base}/auth/nope")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unmute_requires_bearer() {
    let state = BackendState::new();
    state.register_account("tok", FixtureAccount::sample(5, "hana"));
    state.mute("tok", "loud");
    let base = start(&state).await;
    let client = reqwest::Client::new();

    let response = client
        .delete(format!("{base}/profile/mutedUsers/loud"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(state.muted_users("tok"), vec!["loud".to_string()]);

    let response = client
        .delete(format!("{base}/profile/mutedUsers/loud"))
        .bearer_auth("tok")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(state.muted_users("tok").is_empty());
}
