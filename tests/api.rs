mod common;

use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use common::TestServer;

async fn register(client: &Client, base_url: &str, name: &str) -> (String, String) {
    let resp = client
        .post(format!("{}/api/v1/auth/register", base_url))
        .json(&json!({
            "email": format!("{name}@example.com"),
            "username": name,
            "password": "password123"
        }))
        .send()
        .await
        .expect("register");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = resp.json().await.expect("parse register response");
    let token = body["data"]["token"].as_str().expect("token").to_string();
    let user_id = body["data"]["user"]["id"]
        .as_str()
        .expect("user id")
        .to_string();
    (token, user_id)
}

#[tokio::test]
async fn auth_flow() {
    let server = TestServer::start().await;
    let client = Client::new();
    let base = &server.base_url;

    let (token, _) = register(&client, base, "alice").await;

    // duplicate registration conflicts
    let resp = client
        .post(format!("{}/api/v1/auth/register", base))
        .json(&json!({
            "email": "alice@example.com",
            "username": "alice",
            "password": "password123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // short passwords are rejected
    let resp = client
        .post(format!("{}/api/v1/auth/register", base))
        .json(&json!({
            "email": "bob@example.com",
            "username": "bob",
            "password": "short"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // profile requires auth
    let resp = client
        .get(format!("{}/api/v1/auth/profile", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .get(format!("{}/api/v1/auth/profile", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["username"], "alice");
    assert!(body["data"]["password_hash"].is_null());

    // wrong password is rejected
    let resp = client
        .post(format!("{}/api/v1/auth/login", base))
        .json(&json!({"email": "alice@example.com", "password": "wrong-password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // password reset round trip
    let resp = client
        .post(format!("{}/api/v1/auth/reset-request", base))
        .json(&json!({"email": "alice@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let reset_token = body["data"]["token"].as_str().expect("reset token");

    let resp = client
        .post(format!("{}/api/v1/auth/reset", base))
        .json(&json!({"token": reset_token, "new_password": "changed456"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .post(format!("{}/api/v1/auth/login", base))
        .json(&json!({"email": "alice@example.com", "password": "changed456"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // reset tokens are single-use
    let resp = client
        .post(format!("{}/api/v1/auth/reset", base))
        .json(&json!({"token": reset_token, "new_password": "changed789"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // logout revokes the session
    let resp = client
        .post(format!("{}/api/v1/auth/logout", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/api/v1/auth/profile", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn task_lifecycle_flow() {
    let server = TestServer::start().await;
    let client = Client::new();
    let base = &server.base_url;

    let (alice_token, alice_id) = register(&client, base, "alice").await;

    // scenario: 20-point task completed by its assignee
    let resp = client
        .post(format!("{}/api/v1/tasks", base))
        .bearer_auth(&alice_token)
        .json(&json!({
            "title": "Write chapter summary",
            "points": 20,
            "assignee_id": alice_id
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    let task_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "OPEN");
    assert_eq!(body["data"]["creator"]["username"], "alice");

    // title is required
    let resp = client
        .post(format!("{}/api/v1/tasks", base))
        .bearer_auth(&alice_token)
        .json(&json!({"title": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .put(format!("{}/api/v1/tasks/{}", base, task_id))
        .bearer_auth(&alice_token)
        .json(&json!({"status": "DONE"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["points_awarded"], true);
    assert_eq!(body["data"]["task"]["status"], "DONE");
    // first completion also mints the first_task badge
    assert!(
        body["data"]["new_badges"]
            .as_array()
            .unwrap()
            .iter()
            .any(|b| b == "first_task")
    );

    let resp = client
        .get(format!("{}/api/v1/auth/profile", base))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["points"], 20);

    // re-submitting DONE awards nothing further
    let resp = client
        .put(format!("{}/api/v1/tasks/{}", base, task_id))
        .bearer_auth(&alice_token)
        .json(&json!({"status": "DONE"}))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["points_awarded"], false);

    let resp = client
        .get(format!("{}/api/v1/auth/profile", base))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["points"], 20);

    // overdue sweep: a past-due OPEN task flips on the next listing read
    let yesterday = (Utc::now() - Duration::days(1)).to_rfc3339();
    let resp = client
        .post(format!("{}/api/v1/tasks", base))
        .bearer_auth(&alice_token)
        .json(&json!({"title": "Late homework", "due_date": yesterday}))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let late_id = body["data"]["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        // the sweep is idempotent, so a second read observes the same status
        let resp = client
            .get(format!("{}/api/v1/tasks", base))
            .bearer_auth(&alice_token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        let late = body["data"]["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["id"] == late_id.as_str())
            .expect("late task listed");
        assert_eq!(late["status"], "OVERDUE");
    }

    // an overdue task can still be completed for its points
    let resp = client
        .put(format!("{}/api/v1/tasks/{}", base, late_id))
        .bearer_auth(&alice_token)
        .json(&json!({"status": "DONE"}))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["points_awarded"], true);

    // deletion is for the creator or a global admin
    let (bob_token, _) = register(&client, base, "bob").await;
    let resp = client
        .delete(format!("{}/api/v1/tasks/{}", base, task_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .delete(format!("{}/api/v1/tasks/{}", base, task_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{}/api/v1/tasks/{}", base, task_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // the audit trail survives on the remaining task
    let resp = client
        .get(format!("{}/api/v1/tasks/{}/audit", base, late_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let actions: Vec<&str> = body["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"created"));
    assert!(actions.contains(&"updated"));
}

#[tokio::test]
async fn group_membership_flow() {
    let server = TestServer::start().await;
    let client = Client::new();
    let base = &server.base_url;

    let (alice_token, _alice_id) = register(&client, base, "alice").await;
    let (bob_token, bob_id) = register(&client, base, "bob").await;

    let resp = client
        .post(format!("{}/api/v1/groups", base))
        .bearer_auth(&alice_token)
        .json(&json!({"name": "Software Testing Study Group"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    let group_id = body["data"]["id"].as_str().unwrap().to_string();

    // creating the group already made alice an admin member
    let resp = client
        .post(format!("{}/api/v1/groups/{}/join", base, group_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // bob's first join succeeds, the second conflicts
    let resp = client
        .post(format!("{}/api/v1/groups/{}/join", base, group_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = client
        .post(format!("{}/api/v1/groups/{}/join", base, group_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // the creator cannot leave their own group
    let resp = client
        .post(format!("{}/api/v1/groups/{}/leave", base, group_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // membership survives the refused leave
    let resp = client
        .get(format!("{}/api/v1/groups/{}", base, group_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let members = body["data"]["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().any(|m| m["username"] == "alice"));

    // group tasks show up in the detail view
    client
        .post(format!("{}/api/v1/tasks", base))
        .bearer_auth(&alice_token)
        .json(&json!({"title": "Prepare quiz", "group_id": group_id}))
        .send()
        .await
        .unwrap();
    let resp = client
        .get(format!("{}/api/v1/groups/{}", base, group_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["tasks"].as_array().unwrap().len(), 1);

    // bob is not allowed to manage members; alice may remove him
    let resp = client
        .delete(format!("{}/api/v1/groups/{}/members/{}", base, group_id, bob_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .delete(format!("{}/api/v1/groups/{}/members/{}", base, group_id, bob_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // direct member administration: add, duplicate-add, remove
    let resp = client
        .post(format!("{}/api/v1/groups/{}/members", base, group_id))
        .bearer_auth(&alice_token)
        .json(&json!({"user_id": bob_id, "role": "ADMIN"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["role"], "ADMIN");
    assert_eq!(body["data"]["user"]["username"], "bob");

    let resp = client
        .post(format!("{}/api/v1/groups/{}/members", base, group_id))
        .bearer_auth(&alice_token)
        .json(&json!({"user_id": bob_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = client
        .delete(format!("{}/api/v1/groups/{}/members/{}", base, group_id, bob_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // a non-member leave reports absence
    let resp = client
        .post(format!("{}/api/v1/groups/{}/leave", base, group_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // directory annotates membership per caller
    let resp = client
        .get(format!("{}/api/v1/groups/all", base))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let entry = &body["data"]["groups"].as_array().unwrap()[0];
    assert_eq!(entry["is_member"], false);
    assert_eq!(entry["member_count"], 1);

    // deleting the group cascades its tasks
    let resp = client
        .delete(format!("{}/api/v1/groups/{}", base, group_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{}/api/v1/tasks", base))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["results"], 0);
}

#[tokio::test]
async fn admin_and_user_flow() {
    let server = TestServer::start().await;
    let client = Client::new();
    let base = &server.base_url;

    let (alice_token, alice_id) = register(&client, base, "alice").await;
    let (bob_token, _bob_id) = register(&client, base, "bob").await;

    // ordinary users cannot list accounts
    let resp = client
        .get(format!("{}/api/v1/users", base))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // earn alice some points so the admin listing has an order to check
    let resp = client
        .post(format!("{}/api/v1/tasks", base))
        .bearer_auth(&alice_token)
        .json(&json!({"title": "Flashcards", "points": 30}))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let task_id = body["data"]["id"].as_str().unwrap().to_string();
    client
        .put(format!("{}/api/v1/tasks/{}", base, task_id))
        .bearer_auth(&alice_token)
        .json(&json!({"status": "DONE"}))
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("{}/api/v1/users", base))
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let users = body["data"]["users"].as_array().unwrap();
    assert_eq!(users[0]["username"], "alice");
    let points: Vec<i64> = users.iter().map(|u| u["points"].as_i64().unwrap()).collect();
    assert!(points.windows(2).all(|w| w[0] >= w[1]));

    // profile updates are self-or-admin; usernames stay unique
    let resp = client
        .put(format!("{}/api/v1/users/{}", base, alice_id))
        .bearer_auth(&bob_token)
        .json(&json!({"username": "hijacked"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .put(format!("{}/api/v1/users/{}", base, alice_id))
        .bearer_auth(&alice_token)
        .json(&json!({"username": "bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = client
        .put(format!("{}/api/v1/users/{}", base, alice_id))
        .bearer_auth(&alice_token)
        .json(&json!({"username": "alice-the-great"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["username"], "alice-the-great");

    // a user profile lists assigned task summaries
    let resp = client
        .get(format!("{}/api/v1/users/{}", base, alice_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["assigned_tasks"].as_array().unwrap().len(), 1);

    // account deletion cascades
    let resp = client
        .delete(format!("{}/api/v1/users/{}", base, alice_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{}/api/v1/users/{}", base, alice_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // the deleted user's session no longer authenticates
    let resp = client
        .get(format!("{}/api/v1/auth/profile", base))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn notification_flow() {
    let server = TestServer::start().await;
    let client = Client::new();
    let base = &server.base_url;

    let (alice_token, _alice_id) = register(&client, base, "alice").await;
    let (bob_token, bob_id) = register(&client, base, "bob").await;

    // assigning a task to someone else notifies them
    client
        .post(format!("{}/api/v1/tasks", base))
        .bearer_auth(&alice_token)
        .json(&json!({"title": "Peer review", "assignee_id": bob_id}))
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("{}/api/v1/notifications", base))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["results"], 1);
    let notification = &body["data"]["notifications"].as_array().unwrap()[0];
    assert_eq!(notification["kind"], "assignment");
    assert_eq!(notification["read"], false);
    let notification_id = notification["id"].as_str().unwrap().to_string();

    // alice doesn't see bob's notifications, nor can she mark them read
    let resp = client
        .get(format!("{}/api/v1/notifications", base))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["results"], 0);

    let resp = client
        .post(format!("{}/api/v1/notifications/{}/read", base, notification_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client
        .post(format!("{}/api/v1/notifications/{}/read", base, notification_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/api/v1/notifications?unread_only=true", base))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["results"], 0);

    // manual reminders default to the caller
    let resp = client
        .post(format!("{}/api/v1/notifications", base))
        .bearer_auth(&bob_token)
        .json(&json!({
            "kind": "reminder",
            "title": "Study session",
            "message": "Library at 6pm"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .get(format!("{}/api/v1/notifications?unread_only=true", base))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["results"], 1);
}
