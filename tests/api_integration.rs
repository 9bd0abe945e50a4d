//! Integration tests for the contact manager API.
//!
//! These tests verify the full request/response cycle through the HTTP API.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};
use tower::ServiceExt;

use contact_manager::activity::ActivityLog;
use contact_manager::api::{AppState, router};
use contact_manager::config::Config;
use contact_manager::model::Contact;
use contact_manager::storage::Storage;

struct TestApp {
    server: TestServer,
    activity: ActivityLog,
}

async fn create_test_app() -> TestApp {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let activity = ActivityLog::spawn(storage.clone());
    let state = AppState::new(storage, activity.clone());
    let app = router(state, &Config::default());

    TestApp {
        server: TestServer::new(app).unwrap(),
        activity,
    }
}

async fn create_contact(server: &TestServer, body: Value) -> Value {
    let response = server.post("/api/contacts").json(&body).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["data"].clone()
}

async fn create_group(server: &TestServer, name: &str) -> Value {
    let response = server.post("/api/groups").json(&json!({ "name": name })).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["data"].clone()
}

async fn find_group(server: &TestServer, id: &str) -> Value {
    let groups = server.get("/api/groups").await.json::<Value>();
    groups["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["_id"] == id)
        .cloned()
        .unwrap()
}

fn person(name: &str, category: &str) -> Value {
    json!({
        "name": name,
        "email": format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        "phone": "555-0100",
        "category": category,
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app().await;

    let response = app.server.get("/api/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_test_app().await;

    let response = app.server.get("/api/nothing-here").await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(
        response.json::<Value>(),
        json!({ "success": false, "error": "Route not found" })
    );
}

#[tokio::test]
async fn test_router_answers_without_a_server() {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let activity = ActivityLog::spawn(storage.clone());
    let app = router(AppState::new(storage, activity), &Config::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/contacts/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = tokio_test::assert_ok!(serde_json::from_slice(&bytes));
    assert_eq!(body["error"], "Contact not found");
}

#[tokio::test]
async fn test_create_contact_normalises_input() {
    let app = create_test_app().await;

    let contact = create_contact(
        &app.server,
        json!({
            "name": "  Ann Lee ",
            "email": "A@X.COM",
            "phone": "555-0100",
            "tags": "vip, friend , ,vip",
        }),
    )
    .await;

    assert_eq!(contact["name"], "Ann Lee");
    assert_eq!(contact["email"], "a@x.com");
    assert_eq!(contact["tags"], json!(["vip", "friend"]));
    assert_eq!(contact["category"], "Personal");
    assert_eq!(contact["status"], "Active");
    assert_eq!(contact["source"], "Manual");
    assert_eq!(contact["starred"], false);
    assert!(contact["_id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_contact_validation() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/contacts")
        .json(&json!({ "name": "", "email": "nope", "phone": "1", "category": "Enemies" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Validation failed");
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "email", "category"]);

    let listed: Value = app.server.get("/api/contacts").await.json();
    assert_eq!(listed["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/contacts")
        .content_type("application/json")
        .text("{ not json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["success"], false);
}

#[tokio::test]
async fn test_group_count_follows_contact_lifecycle() {
    let app = create_test_app().await;

    let group = create_group(&app.server, "Work").await;
    let group_id = group["_id"].as_str().unwrap();
    assert_eq!(group["contactCount"], 0);
    assert_eq!(group["color"], "#667eea");

    let mut body = person("Ann", "Work");
    body["groups"] = json!([group_id]);
    let contact = create_contact(&app.server, body).await;
    let contact_id = contact["_id"].as_str().unwrap();

    assert_eq!(find_group(&app.server, group_id).await["contactCount"], 1);

    app.server
        .delete(&format!("/api/contacts/{contact_id}"))
        .await
        .assert_status_ok();

    assert_eq!(find_group(&app.server, group_id).await["contactCount"], 0);
}

#[tokio::test]
async fn test_duplicate_group_name() {
    let app = create_test_app().await;

    create_group(&app.server, "Work").await;
    let response = app
        .server
        .post("/api/groups")
        .json(&json!({ "name": " Work " }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["error"],
        "Group \"Work\" already exists"
    );

    let groups: Value = app.server.get("/api/groups").await.json();
    assert_eq!(groups["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rename_group_onto_existing_name() {
    let app = create_test_app().await;

    create_group(&app.server, "Family").await;
    let work = create_group(&app.server, "Work").await;
    let work_id = work["_id"].as_str().unwrap();

    let response = app
        .server
        .put(&format!("/api/groups/{work_id}"))
        .json(&json!({ "name": "Family" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .put(&format!("/api/groups/{work_id}"))
        .json(&json!({ "name": "Office", "isPrivate": true }))
        .await;
    response.assert_status_ok();
    let updated = response.json::<Value>()["data"].clone();
    assert_eq!(updated["name"], "Office");
    assert_eq!(updated["isPrivate"], true);

    app.server
        .put("/api/groups/missing")
        .json(&json!({ "name": "Ghost" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_group_delete_detaches_members() {
    let app = create_test_app().await;

    let group = create_group(&app.server, "Work").await;
    let group_id = group["_id"].as_str().unwrap();

    let mut body = person("Ann", "Work");
    body["groups"] = json!([group_id, "other"]);
    let contact = create_contact(&app.server, body).await;
    let contact_id = contact["_id"].as_str().unwrap();

    app.server
        .delete(&format!("/api/groups/{group_id}"))
        .await
        .assert_status_ok();

    let detail: Value = app
        .server
        .get(&format!("/api/contacts/{contact_id}"))
        .await
        .json();
    // The detail view drops references to groups that no longer exist.
    assert_eq!(detail["data"]["groups"], json!([]));

    let exported: Vec<Contact> = app.server.get("/api/contacts/export/json").await.json();
    assert_eq!(exported[0].groups, vec!["other".to_string()]);

    app.server
        .delete(&format!("/api/groups/{group_id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_contacts_embed_their_groups() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/groups")
        .json(&json!({ "name": "Work", "color": "#ff0000", "icon": "💼" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let work = response.json::<Value>()["data"].clone();
    let work_id = work["_id"].as_str().unwrap();

    let mut body = person("Ann", "Work");
    body["groups"] = json!([work_id, "gone"]);
    let contact = create_contact(&app.server, body).await;
    let contact_id = contact["_id"].as_str().unwrap();
    create_contact(&app.server, person("Bob", "Family")).await;

    let listed: Value = app
        .server
        .get("/api/contacts?sortBy=name&sortOrder=asc")
        .await
        .json();
    assert_eq!(
        listed["data"][0]["groups"],
        json!([{ "_id": work_id, "name": "Work", "color": "#ff0000" }])
    );
    assert_eq!(listed["data"][1]["groups"], json!([]));

    let detail: Value = app
        .server
        .get(&format!("/api/contacts/{contact_id}"))
        .await
        .json();
    assert_eq!(
        detail["data"]["groups"],
        json!([{ "_id": work_id, "name": "Work", "color": "#ff0000", "icon": "💼" }])
    );
}

#[tokio::test]
async fn test_attach_and_detach_group() {
    let app = create_test_app().await;

    let group = create_group(&app.server, "Friends").await;
    let group_id = group["_id"].as_str().unwrap();
    let contact = create_contact(&app.server, person("Ann", "Friends")).await;
    let contact_id = contact["_id"].as_str().unwrap();
    let path = format!("/api/contacts/{contact_id}/groups/{group_id}");

    let attached: Value = app.server.post(&path).await.json();
    assert_eq!(attached["data"]["groups"], json!([group_id]));
    // A second attach changes nothing.
    app.server.post(&path).await.assert_status_ok();
    assert_eq!(find_group(&app.server, group_id).await["contactCount"], 1);

    let detached: Value = app.server.delete(&path).await.json();
    assert_eq!(detached["data"]["groups"], json!([]));
    assert_eq!(find_group(&app.server, group_id).await["contactCount"], 0);

    app.activity.flush().await;
    let activities: Value = app.server.get("/api/analytics/activities").await.json();
    let actions: Vec<&str> = activities["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["action"].as_str().unwrap())
        .collect();
    assert_eq!(
        actions,
        vec!["REMOVE_FROM_GROUP", "ADD_TO_GROUP", "CREATE_CONTACT"]
    );

    app.server
        .post(&format!("/api/contacts/{contact_id}/groups/missing"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_filter_and_paginate() {
    let app = create_test_app().await;

    for i in 0..12 {
        create_contact(&app.server, person(&format!("Biz {i}"), "Business")).await;
    }
    for i in 0..3 {
        create_contact(&app.server, person(&format!("Pal {i}"), "Friends")).await;
    }

    let response = app
        .server
        .get("/api/contacts?category=Business&page=2&limit=5")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(
        body["pagination"],
        json!({ "total": 12, "page": 2, "limit": 5, "pages": 3 })
    );
    assert_eq!(body["filters"]["categories"], json!(["Business", "Friends"]));
    assert_eq!(body["filters"]["statuses"], json!(["Active"]));
}

#[tokio::test]
async fn test_search_and_sort() {
    let app = create_test_app().await;

    create_contact(&app.server, person("Carol Diaz", "Work")).await;
    create_contact(&app.server, person("Ann Smith", "Work")).await;
    create_contact(&app.server, person("Bob Smith", "Family")).await;

    let search = urlencoding::encode("SMITH");
    let body: Value = app
        .server
        .get(&format!("/api/contacts?search={search}&sortBy=name&sortOrder=asc"))
        .await
        .json();
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ann Smith", "Bob Smith"]);

    // Unknown sort keys keep insertion order.
    let body: Value = app
        .server
        .get("/api/contacts?sortBy=favouriteColour")
        .await
        .json();
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Carol Diaz", "Ann Smith", "Bob Smith"]);

    let response = app.server.get("/api/contacts?limit=1000").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["errors"][0]["field"], "limit");
}

#[tokio::test]
async fn test_facet_endpoint() {
    let app = create_test_app().await;

    let mut body = person("Ann", "Work");
    body["tags"] = json!(["vip", "alpha"]);
    create_contact(&app.server, body).await;

    let tags: Value = app.server.get("/api/contacts/filters/tags").await.json();
    assert_eq!(tags["data"], json!(["alpha", "vip"]));

    app.server
        .get("/api/contacts/filters/colours")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_records_submitted_fields() {
    let app = create_test_app().await;

    let contact = create_contact(&app.server, person("Ann", "Work")).await;
    let id = contact["_id"].as_str().unwrap();

    let response = app
        .server
        .put(&format!("/api/contacts/{id}"))
        .json(&json!({ "name": "Ann Lee", "phone": "555-0100", "email": "ANN.LEE@X.COM" }))
        .await;
    response.assert_status_ok();
    let updated = response.json::<Value>()["data"].clone();
    assert_eq!(updated["name"], "Ann Lee");
    assert_eq!(updated["email"], "ann.lee@x.com");
    assert_eq!(updated["category"], "Work");

    app.activity.flush().await;
    let detail: Value = app.server.get(&format!("/api/contacts/{id}")).await.json();
    let latest = &detail["activities"][0];
    assert_eq!(latest["action"], "UPDATE_CONTACT");
    assert_eq!(latest["performedBy"], "User");
    assert_eq!(
        latest["changes"]["name"],
        json!({ "old": "Ann", "new": "Ann Lee" })
    );
    // Unchanged values are still recorded.
    assert_eq!(
        latest["changes"]["phone"],
        json!({ "old": "555-0100", "new": "555-0100" })
    );

    let response = app
        .server
        .put(&format!("/api/contacts/{id}"))
        .json(&json!({ "email": "broken" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    app.server
        .put("/api/contacts/missing")
        .json(&json!({ "name": "Ghost" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_star_toggle_twice() {
    let app = create_test_app().await;

    let contact = create_contact(&app.server, person("Ann", "Work")).await;
    let id = contact["_id"].as_str().unwrap();
    let path = format!("/api/contacts/{id}/star");

    let first: Value = app.server.post(&path).await.json();
    assert_eq!(first["data"]["starred"], true);
    assert_eq!(first["message"], "Contact starred successfully");

    let second: Value = app.server.post(&path).await.json();
    assert_eq!(second["data"]["starred"], false);

    app.activity.flush().await;
    let detail: Value = app.server.get(&format!("/api/contacts/{id}")).await.json();
    assert_eq!(detail["data"]["starred"], false);
    assert_eq!(detail["activities"][0]["action"], "UNSTARRED");
    assert_eq!(detail["activities"][1]["action"], "STARRED");
    assert_eq!(detail["activities"][1]["changes"], json!({ "starred": true }));
}

#[tokio::test]
async fn test_bulk_delete() {
    let app = create_test_app().await;

    let group = create_group(&app.server, "Work").await;
    let group_id = group["_id"].as_str().unwrap();

    let mut ids = Vec::new();
    for name in ["Ann", "Bob", "Cat", "Dan"] {
        let mut body = person(name, "Work");
        body["groups"] = json!([group_id]);
        let contact = create_contact(&app.server, body).await;
        ids.push(contact["_id"].as_str().unwrap().to_string());
    }

    let response = app
        .server
        .post("/api/contacts/bulk/actions")
        .json(&json!({ "action": "delete", "contactIds": &ids[..3] }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"], json!({ "deletedCount": 3 }));
    assert_eq!(body["message"], "Bulk action 'delete' completed successfully");

    let listed: Value = app.server.get("/api/contacts").await.json();
    assert_eq!(listed["pagination"]["total"], 1);
    assert_eq!(find_group(&app.server, group_id).await["contactCount"], 1);

    app.activity.flush().await;
    let activities: Value = app.server.get("/api/analytics/activities").await.json();
    let entry = &activities["data"][0];
    assert_eq!(entry["action"], "BULK_DELETE");
    assert_eq!(entry["entityName"], "Multiple Contacts");
    assert_eq!(entry["entityId"], Value::Null);
    assert_eq!(entry["changes"]["deletedCount"], 3);
    assert_eq!(entry["changes"]["affectedContacts"], 3);
}

#[tokio::test]
async fn test_bulk_status_and_star() {
    let app = create_test_app().await;

    let a = create_contact(&app.server, person("Ann", "Work")).await;
    let b = create_contact(&app.server, person("Bob", "Work")).await;
    let ids = json!([a["_id"], b["_id"]]);

    let body: Value = app
        .server
        .post("/api/contacts/bulk/actions")
        .json(&json!({ "action": "change-status", "contactIds": ids, "data": { "status": "Archived" } }))
        .await
        .json();
    assert_eq!(body["data"], json!({ "matchedCount": 2, "modifiedCount": 2 }));

    app.server
        .post("/api/contacts/bulk/actions")
        .json(&json!({ "action": "star", "contactIds": ids }))
        .await
        .assert_status_ok();

    let listed: Value = app
        .server
        .get("/api/contacts?status=Archived&starred=true")
        .await
        .json();
    assert_eq!(listed["pagination"]["total"], 2);

    // Both are already starred: matched but not modified.
    let again: Value = app
        .server
        .post("/api/contacts/bulk/actions")
        .json(&json!({ "action": "star", "contactIds": ids }))
        .await
        .json();
    assert_eq!(again["data"], json!({ "matchedCount": 2, "modifiedCount": 0 }));

    app.activity.flush().await;
    let activities: Value = app.server.get("/api/analytics/activities").await.json();
    assert_eq!(activities["data"][0]["action"], "BULK_STAR");
    assert_eq!(activities["data"][0]["changes"]["modifiedCount"], 0);
    assert_eq!(activities["data"][1]["action"], "BULK_STAR");
    assert_eq!(activities["data"][1]["changes"]["modifiedCount"], 2);
    assert_eq!(activities["data"][2]["action"], "BULK_CHANGE_STATUS");
    assert_eq!(activities["data"][2]["changes"]["newStatus"], "Archived");
}

#[tokio::test]
async fn test_bulk_rejections() {
    let app = create_test_app().await;

    let cases = [
        (json!({ "contactIds": [] }), "Invalid request"),
        (json!({ "action": "delete", "contactIds": "abc" }), "Invalid request"),
        (json!({ "action": "explode", "contactIds": [] }), "Invalid action"),
        (json!({ "action": "change-status", "contactIds": [] }), "Status is required"),
    ];

    for (request, error) in cases {
        let response = app
            .server
            .post("/api/contacts/bulk/actions")
            .json(&request)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], error, "for {request}");
    }

    app.activity.flush().await;
    let activities: Value = app.server.get("/api/analytics/activities").await.json();
    assert_eq!(activities["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_json_export_round_trip() {
    let app = create_test_app().await;

    let mut body = person("Ann", "Work");
    body["tags"] = json!(["vip"]);
    body["customFields"] = json!({ "company": "Acme" });
    create_contact(&app.server, body).await;
    create_contact(&app.server, person("Bob", "Family")).await;

    let response = app.server.get("/api/contacts/export/json").await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=contacts.json"
    );

    let exported: Vec<Contact> = response.json();
    let listed: Value = app.server.get("/api/contacts?sortBy=createdAt&sortOrder=asc").await.json();
    let listed: Vec<Contact> = serde_json::from_value(listed["data"].clone()).unwrap();
    assert_eq!(exported, listed);
    assert_eq!(exported[0].custom_fields["company"], "Acme");

    app.activity.flush().await;
    let activities: Value = app.server.get("/api/analytics/activities").await.json();
    assert_eq!(activities["data"][0]["action"], "EXPORT");
    assert_eq!(
        activities["data"][0]["changes"],
        json!({ "format": "json", "count": 2 })
    );
}

#[tokio::test]
async fn test_csv_export() {
    let app = create_test_app().await;

    let mut body = person("Ann", "Work");
    body["tags"] = json!(["vip", "friend"]);
    create_contact(&app.server, body).await;
    create_contact(&app.server, person("Bob", "Family")).await;

    let response = app.server.get("/api/contacts/export/csv?category=Work").await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=contacts.csv"
    );

    let text = response.text();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Name,Email,Phone,Category,Status,Tags,Created")
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("Ann,ann@example.com,555-0100,Work,Active,\"vip, friend\","));
    assert_eq!(lines.next(), None);

    app.server
        .get("/api/contacts/export/xml")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dashboard() {
    let app = create_test_app().await;

    create_group(&app.server, "Work").await;
    let mut starred = person("Ann", "Work");
    starred["starred"] = json!(true);
    create_contact(&app.server, starred).await;
    create_contact(&app.server, person("Bob", "Work")).await;
    let mut inactive = person("Cat", "Family");
    inactive["status"] = json!("Inactive");
    create_contact(&app.server, inactive).await;

    app.activity.flush().await;
    let response = app.server.get("/api/analytics/dashboard").await;
    response.assert_status_ok();
    let data = response.json::<Value>()["data"].clone();

    assert_eq!(
        data["summary"],
        json!({
            "totalContacts": 3,
            "activeContacts": 2,
            "starredContacts": 1,
            "totalGroups": 1,
        })
    );
    assert_eq!(data["categoryStats"][0], json!({ "category": "Work", "count": 2 }));
    assert_eq!(data["weeklyStats"].as_array().unwrap().iter().map(|d| d["count"].as_i64().unwrap()).sum::<i64>(), 3);
    assert_eq!(data["latestContacts"][0]["name"], "Cat");
    assert_eq!(data["recentActivities"].as_array().unwrap().len(), 3);
}
