mod support;

use serde_json::{Value, json};
use tokio_tungstenite::tungstenite;

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

#[tokio::test]
async fn upgrade_without_token_is_rejected() {
    let result = tokio_tungstenite::connect_async(support::ws_url(None)).await;

    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), tungstenite::http::StatusCode::UNAUTHORIZED)
        }
        other => panic!("expected an http rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn connecting_sends_identity_and_lobby_list() {
    let id = unique("solo");
    let mut socket = support::connect(&format!("{id}:Solo")).await;

    let identity = support::expect_message(&mut socket, "client", "get").await;
    assert_eq!(identity["id"], id.as_str());
    assert_eq!(identity["display_name"], "Solo");

    let list = support::expect_message(&mut socket, "lobbies", "get").await;
    assert!(list.is_array());
}

#[tokio::test]
async fn create_and_join_share_a_roster() {
    let prefix = unique("room");
    let owner_id = format!("{prefix}-0");
    let guest_id = format!("{prefix}-1");

    let mut owner = support::connect(&owner_id).await;
    support::send(&mut owner, "lobbies", "create", json!({ "type": 2 })).await;
    let roster = support::expect_roster(&mut owner, 1).await;
    assert_eq!(roster["owner"], owner_id.as_str());
    assert_eq!(roster["type"], 2);
    let lobby_id = roster["id"].as_str().expect("lobby id").to_string();

    let mut guest = support::connect(&guest_id).await;
    support::send(&mut guest, "lobbies", "join", json!({ "id": lobby_id })).await;

    let seen_by_guest = support::expect_roster(&mut guest, 2).await;
    let seen_by_owner = support::expect_roster(&mut owner, 2).await;
    assert_eq!(seen_by_guest, seen_by_owner);
    assert_eq!(seen_by_owner["owner"], owner_id.as_str());

    // The owner leaving hands the lobby to the remaining member.
    support::send(&mut owner, "lobby", "leave", Value::Null).await;
    let roster = support::expect_roster(&mut guest, 1).await;
    assert_eq!(roster["owner"], guest_id.as_str());
}

#[tokio::test]
async fn private_lobbies_are_hidden_from_the_http_listing() {
    let base_url = support::ensure_server();
    let mut owner = support::connect(&unique("hidden")).await;
    support::send(&mut owner, "lobbies", "create", json!({ "private": true })).await;
    let roster = support::expect_roster(&mut owner, 1).await;
    assert_eq!(roster["private"], true);
    let lobby_id = roster["id"].as_str().expect("lobby id").to_string();

    let res = reqwest::get(format!("{base_url}/lobbies"))
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    let lobbies: Vec<Value> = res.json().await.expect("lobby list");
    assert!(lobbies.iter().all(|lobby| lobby["id"] != lobby_id.as_str()));
}

#[tokio::test]
async fn five_players_start_a_game() {
    let prefix = unique("table");
    let ids: Vec<String> = (0..5).map(|i| format!("{prefix}-{i}")).collect();

    let mut sockets = Vec::new();
    for id in &ids {
        sockets.push(support::connect(id).await);
    }

    support::send(&mut sockets[0], "lobbies", "create", json!({})).await;
    let roster = support::expect_roster(&mut sockets[0], 1).await;
    let lobby_id = roster["id"].as_str().expect("lobby id").to_string();

    for socket in sockets.iter_mut().skip(1) {
        support::send(socket, "lobbies", "join", json!({ "id": lobby_id })).await;
    }
    support::expect_roster(&mut sockets[0], 5).await;

    support::send(&mut sockets[0], "lobby", "start", Value::Null).await;

    let mut captains = Vec::new();
    for socket in sockets.iter_mut() {
        let game = support::expect_message(socket, "game", "get").await;
        assert_eq!(game["players"].as_array().map(Vec::len), Some(5));
        assert_eq!(game["rounds"].as_array().map(Vec::len), Some(5));

        let captain = support::expect_message(socket, "game", "choose").await;
        captains.push(captain.as_str().expect("captain id").to_string());
    }

    captains.dedup();
    assert_eq!(captains.len(), 1, "every player sees the same captain");
    assert!(ids.contains(&captains[0]));
}

#[tokio::test]
async fn reconnecting_closes_the_previous_socket() {
    let id = unique("twice");
    let mut first = support::connect(&id).await;
    support::expect_message(&mut first, "client", "get").await;

    let mut second = support::connect(&id).await;
    support::expect_message(&mut second, "client", "get").await;

    assert!(support::closed_by_server(&mut first).await);
}
