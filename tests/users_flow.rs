use std::sync::Arc;

use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::{Client, LocalResponse};
use serde_json::{Value, json};
use tracker_api::notify::RecordingNotifier;
use tracker_api::test_support::TestRocketBuilder;

struct Harness {
    client: Client,
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    let client = TestRocketBuilder::new()
        .mount_api_routes(tracker_api::api_routes())
        .with_notifier(notifier.clone())
        .blocking_client();
    Harness { client, notifier }
}

fn post<'c>(client: &'c Client, uri: &'static str, body: Value) -> LocalResponse<'c> {
    client
        .post(uri)
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

fn register(client: &Client, email: &str, password: &str) -> Value {
    let response = post(
        client,
        "/api/v1/users/register",
        json!({
            "email": email,
            "firstName": "Ada",
            "lastName": "Lovelace",
            "password": password,
        }),
    );
    assert_eq!(response.status(), Status::Created);
    response.into_json().expect("register body")
}

fn login(client: &Client, email: &str, password: &str) -> (Status, Value) {
    let response = post(
        client,
        "/api/v1/users/login",
        json!({ "email": email, "password": password }),
    );
    let status = response.status();
    (status, response.into_json().expect("login body"))
}

#[test]
fn register_login_and_fetch_profile() {
    let Harness { client, .. } = harness();

    let registered = register(&client, "a@x.com", "secret123");
    assert_eq!(registered["statusCode"], 201);
    assert_eq!(registered["data"]["user"]["email"], "a@x.com");
    assert!(registered["data"]["user"].get("passwordHash").is_none());

    let (status, body) = login(&client, "a@x.com", "secret123");
    assert_eq!(status, Status::Ok);
    let token = body["data"]["token"].as_str().expect("token").to_string();
    assert!(body["data"]["expiresAt"].is_string());

    let response = client.get("/api/v1/users/me").header(bearer(&token)).dispatch();
    assert_eq!(response.status(), Status::Ok);
    let profile: Value = response.into_json().expect("profile body");
    assert_eq!(profile["data"]["email"], "a@x.com");
    assert_eq!(profile["data"]["firstName"], "Ada");
}

#[test]
fn tampered_or_missing_tokens_get_a_generic_401() {
    let Harness { client, .. } = harness();
    let registered = register(&client, "a@x.com", "secret123");
    let token = registered["data"]["token"].as_str().expect("token").to_string();

    let mut tampered = token.into_bytes();
    let idx = tampered.len() - 2;
    tampered[idx] = if tampered[idx] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).expect("ascii token");

    let attempts = [
        client.get("/api/v1/users/me").header(bearer(&tampered)).dispatch(),
        client.get("/api/v1/users/me").dispatch(),
        client
            .get("/api/v1/users/me")
            .header(Header::new("Authorization", "Token abc"))
            .dispatch(),
        client.get("/api/v1/users/me").header(bearer("not-a-jwt")).dispatch(),
    ];

    for response in attempts {
        assert_eq!(response.status(), Status::Unauthorized);
        let body: Value = response.into_json().expect("error body");
        assert_eq!(body["statusCode"], 401);
        assert_eq!(body["message"], "permission denied");
    }
}

#[test]
fn login_failures_do_not_reveal_which_part_was_wrong() {
    let Harness { client, .. } = harness();
    register(&client, "a@x.com", "secret123");

    let (unknown_status, unknown) = login(&client, "nobody@x.com", "secret123");
    let (wrong_status, wrong) = login(&client, "a@x.com", "wrong-password");

    assert_eq!(unknown_status, Status::Unauthorized);
    assert_eq!(wrong_status, Status::Unauthorized);
    assert_eq!(unknown["message"], wrong["message"]);
    assert_eq!(wrong["message"], "invalid email or password");
}

#[test]
fn login_is_case_insensitive_on_email() {
    let Harness { client, .. } = harness();
    register(&client, "Mixed@Example.com", "secret123");

    let (status, _) = login(&client, "mixed@example.COM", "secret123");
    assert_eq!(status, Status::Ok);
}

#[test]
fn registration_validates_input() {
    let Harness { client, .. } = harness();
    register(&client, "a@x.com", "secret123");

    let duplicate = post(
        &client,
        "/api/v1/users/register",
        json!({ "email": "A@x.com", "firstName": "A", "lastName": "B", "password": "secret123" }),
    );
    assert_eq!(duplicate.status(), Status::Conflict);

    let weak = post(
        &client,
        "/api/v1/users/register",
        json!({ "email": "b@x.com", "firstName": "A", "lastName": "B", "password": "short" }),
    );
    assert_eq!(weak.status(), Status::BadRequest);

    let missing = post(
        &client,
        "/api/v1/users/register",
        json!({ "email": "c@x.com", "lastName": "B", "password": "secret123" }),
    );
    assert_eq!(missing.status(), Status::BadRequest);
    let body: Value = missing.into_json().expect("error body");
    assert_eq!(body["message"], "missing required field: firstName");

    let bad_email = post(
        &client,
        "/api/v1/users/register",
        json!({ "email": "not-an-email", "firstName": "A", "lastName": "B", "password": "secret123" }),
    );
    assert_eq!(bad_email.status(), Status::BadRequest);
}

#[test]
fn profile_update_applies_only_provided_fields() {
    let Harness { client, .. } = harness();
    let registered = register(&client, "a@x.com", "secret123");
    let token = registered["data"]["token"].as_str().expect("token").to_string();
    register(&client, "taken@x.com", "secret123");

    let response = client
        .put("/api/v1/users/me")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "lastName": "Byron", "phone": "555-0100" }).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().expect("profile body");
    assert_eq!(body["data"]["firstName"], "Ada");
    assert_eq!(body["data"]["lastName"], "Byron");
    assert_eq!(body["data"]["phone"], "555-0100");

    let conflict = client
        .put("/api/v1/users/me")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "email": "taken@x.com" }).to_string())
        .dispatch();
    assert_eq!(conflict.status(), Status::Conflict);

    let empty = client
        .put("/api/v1/users/me")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body("{}")
        .dispatch();
    assert_eq!(empty.status(), Status::BadRequest);
}

#[test]
fn reset_rejects_weak_password_then_accepts_strong_one() {
    let Harness { client, notifier } = harness();
    register(&client, "a@x.com", "secret123");

    let response = post(
        &client,
        "/api/v1/users/reset-password",
        json!({ "email": "a@x.com" }),
    );
    assert_eq!(response.status(), Status::Ok);
    let reset_token = notifier.last_token_for("a@x.com").expect("token delivered");

    let weak = post(
        &client,
        "/api/v1/users/reset-password/confirm",
        json!({ "resetToken": reset_token, "newPassword": "short1" }),
    );
    assert_eq!(weak.status(), Status::BadRequest);
    assert_eq!(login(&client, "a@x.com", "secret123").0, Status::Ok);

    let strong = post(
        &client,
        "/api/v1/users/reset-password/confirm",
        json!({ "resetToken": reset_token, "newPassword": "brand-new-secret" }),
    );
    assert_eq!(strong.status(), Status::Ok);

    assert_eq!(login(&client, "a@x.com", "secret123").0, Status::Unauthorized);
    assert_eq!(login(&client, "a@x.com", "brand-new-secret").0, Status::Ok);

    let replay = post(
        &client,
        "/api/v1/users/reset-password/confirm",
        json!({ "resetToken": reset_token, "newPassword": "another-secret" }),
    );
    assert_eq!(replay.status(), Status::BadRequest);
    let body: Value = replay.into_json().expect("error body");
    assert_eq!(body["message"], "invalid or expired reset token");
}

#[test]
fn reset_request_does_not_reveal_registered_emails() {
    let Harness { client, notifier } = harness();
    register(&client, "a@x.com", "secret123");

    let known = post(
        &client,
        "/api/v1/users/reset-password",
        json!({ "email": "a@x.com" }),
    );
    let known_status = known.status();
    let known: Value = known.into_json().expect("body");

    let unknown = post(
        &client,
        "/api/v1/users/reset-password",
        json!({ "email": "nobody@x.com" }),
    );
    let unknown_status = unknown.status();
    let unknown: Value = unknown.into_json().expect("body");

    assert_eq!(known_status, Status::Ok);
    assert_eq!(unknown_status, Status::Ok);
    assert_eq!(known, unknown);
    assert_eq!(notifier.delivered(), 1);
}

#[test]
fn failed_delivery_is_reported_and_token_withdrawn() {
    let Harness { client, notifier } = harness();
    register(&client, "a@x.com", "secret123");
    notifier.set_failing(true);

    let response = post(
        &client,
        "/api/v1/users/reset-password",
        json!({ "email": "a@x.com" }),
    );
    assert_eq!(response.status(), Status::BadGateway);
    assert!(notifier.last_token_for("a@x.com").is_none());
}
