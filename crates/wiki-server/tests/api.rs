use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiki_server::{auth, create_router, db, Config, DbPool};
use wiki_shared::structure::{build_structure, plan_move, siblings_of, Direction};
use wiki_shared::{CategoryTree, NodeKind, PageWithRelations, Role};

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    pool: DbPool,
}

impl TestApp {
    async fn new() -> Self {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let config = Config {
            database_url: "sqlite::memory:".into(),
            jwt_secret: SECRET.into(),
            jwt_expires_in: 3600,
            port: 0,
            admin_username: None,
            admin_password: None,
        };

        Self {
            router: create_router(pool.clone(), config),
            pool,
        }
    }

    /// Insert a user directly and return its id and a bearer token.
    async fn user(&self, username: &str, role: Role) -> (i64, String) {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO users (username, password_hash, role, created_at, updated_at) VALUES (?, 'unused', ?, ?, ?)",
        )
        .bind(username)
        .bind(role)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let token = auth::create_access_token(id, username, SECRET, 3600).unwrap();
        (id, token)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    async fn order_of(&self, table: &str, id: i64) -> i64 {
        let (order,): (i64,) = sqlx::query_as(&format!("SELECT sort_order FROM {table} WHERE id = ?"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .unwrap();
        order
    }

    async fn structure(&self, token: &str) -> Vec<wiki_shared::StructureNode> {
        let (_, categories) = self.get("/api/categories", token).await;
        let (_, pages) = self.get("/api/pages", token).await;
        let categories: Vec<CategoryTree> = serde_json::from_value(categories).unwrap();
        let pages: Vec<PageWithRelations> = serde_json::from_value(pages).unwrap();
        build_structure(&categories, &pages)
    }
}

fn titles(nodes: &[wiki_shared::StructureNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.title.as_str()).collect()
}

#[tokio::test]
async fn health_check_is_public() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/api/pages", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"message": "Unauthenticated"}));

    let (status, _) = app.get("/api/pages", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Token outlives its user.
    let (id, token) = app.user("ghost", Role::User).await;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&app.pool)
        .await
        .unwrap();
    let (status, _) = app.get("/api/user", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_issues_a_working_token() {
    let app = TestApp::new().await;
    db::bootstrap_admin(&app.pool, "root", "password123").await.unwrap();
    // Second run leaves the account alone.
    db::bootstrap_admin(&app.pool, "root", "other-password").await.unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": "root", "password": "password123"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = app.get("/api/user", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "root");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": "root", "password": "other-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["username"].is_array());
}

#[tokio::test]
async fn categories_append_and_suffix_slugs() {
    let app = TestApp::new().await;
    let (_, token) = app.user("doc", Role::Documentaliste).await;

    let (status, first) = app.post("/api/categories", &token, json!({"name": "Docs"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["order"], 1);
    assert_eq!(first["slug"], "docs");

    let (_, second) = app.post("/api/categories", &token, json!({"name": "Docs"})).await;
    assert_eq!(second["slug"], "docs-1");
    assert_eq!(second["order"], 2);

    // Order is scoped to the parent.
    let (_, child) = app
        .post(
            "/api/categories",
            &token,
            json!({"name": "Guides", "parent_id": first["id"]}),
        )
        .await;
    assert_eq!(child["order"], 1);

    let (status, shown) = app
        .get(&format!("/api/categories/{}", first["id"]), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shown["children"][0]["name"], "Guides");
}

#[tokio::test]
async fn plain_users_cannot_manage_categories() {
    let app = TestApp::new().await;
    let (_, token) = app.user("reader", Role::User).await;

    let (status, body) = app.post("/api/categories", &token, json!({"name": "Docs"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"message": "Unauthorized"}));
}

#[tokio::test]
async fn category_cannot_move_under_its_descendant() {
    let app = TestApp::new().await;
    let (_, token) = app.user("admin", Role::Admin).await;

    let (_, root) = app.post("/api/categories", &token, json!({"name": "Root"})).await;
    let (_, child) = app
        .post("/api/categories", &token, json!({"name": "Child", "parent_id": root["id"]}))
        .await;

    let (status, body) = app
        .put(
            &format!("/api/categories/{}", root["id"]),
            &token,
            json!({"parent_id": child["id"]}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["parent_id"].is_array());

    let (status, _) = app
        .put(
            &format!("/api/categories/{}", root["id"]),
            &token,
            json!({"parent_id": root["id"]}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn deleting_a_category_detaches_its_contents() {
    let app = TestApp::new().await;
    let (_, token) = app.user("admin", Role::Admin).await;

    let (_, docs) = app.post("/api/categories", &token, json!({"name": "Docs"})).await;
    let (_, sub) = app
        .post("/api/categories", &token, json!({"name": "Sub", "parent_id": docs["id"]}))
        .await;
    let (_, page) = app
        .post("/api/pages", &token, json!({"title": "Intro", "category_id": docs["id"]}))
        .await;

    let (status, _) = app.delete(&format!("/api/categories/{}", docs["id"]), &token).await;
    assert_eq!(status, StatusCode::OK);

    let (_, sub) = app.get(&format!("/api/categories/{}", sub["id"]), &token).await;
    assert_eq!(sub["parent_id"], Value::Null);
    let (_, page) = app.get(&format!("/api/pages/{}", page["id"]), &token).await;
    assert_eq!(page["category_id"], Value::Null);
}

#[tokio::test]
async fn pages_are_found_by_id_or_slug() {
    let app = TestApp::new().await;
    let (_, token) = app.user("writer", Role::User).await;

    let content = json!([{"id": "b1", "type": "h1", "content": "Welcome"}]);
    let (status, page) = app
        .post(
            "/api/pages",
            &token,
            json!({"title": "Getting Started", "content": content}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(page["slug"], "getting-started");
    assert_eq!(page["content"], content);

    let (status, by_slug) = app.get("/api/pages/getting-started", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_slug["id"], page["id"]);
    assert_eq!(by_slug["user"]["username"], "writer");

    let (status, _) = app.get("/api/pages/missing", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Same title, same slug.
    let (status, body) = app
        .post("/api/pages", &token, json!({"title": "Getting started!"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["title"].is_array());
}

#[tokio::test]
async fn page_content_must_be_a_block_array() {
    let app = TestApp::new().await;
    let (_, token) = app.user("writer", Role::User).await;

    let (status, body) = app
        .post(
            "/api/pages",
            &token,
            json!({"title": "Odd", "content": {"type": "text"}}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["content"].is_array());
}

#[tokio::test]
async fn only_owner_or_manager_edits_a_page() {
    let app = TestApp::new().await;
    let (_, owner) = app.user("owner", Role::User).await;
    let (_, other) = app.user("other", Role::User).await;
    let (_, doc) = app.user("doc", Role::Documentaliste).await;

    let (_, page) = app.post("/api/pages", &owner, json!({"title": "Mine"})).await;
    let uri = format!("/api/pages/{}", page["id"]);

    let (status, _) = app.put(&uri, &other, json!({"title": "Stolen"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app.put(&uri, &doc, json!({"title": "Reviewed", "tag": "DRAFT"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Reviewed");
    // Renaming keeps the slug.
    assert_eq!(updated["slug"], "mine");
    assert_eq!(updated["tag"], "DRAFT");

    let (status, body) = app.put(&uri, &owner, json!({"slug": "Not Valid"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["slug"].is_array());

    let (status, _) = app.delete(&uri, &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, &owner).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sub_pages_survive_parent_deletion_and_cycles_are_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.user("writer", Role::User).await;

    let (_, parent) = app.post("/api/pages", &token, json!({"title": "Parent"})).await;
    let (_, child) = app
        .post("/api/pages", &token, json!({"title": "Child", "parent_id": parent["id"]}))
        .await;

    let (_, shown) = app.get(&format!("/api/pages/{}", parent["id"]), &token).await;
    assert_eq!(shown["children"][0]["title"], "Child");

    let (status, _) = app
        .put(
            &format!("/api/pages/{}", parent["id"]),
            &token,
            json!({"parent_id": child["id"]}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    app.delete(&format!("/api/pages/{}", parent["id"]), &token).await;
    let (status, orphan) = app.get(&format!("/api/pages/{}", child["id"]), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orphan["parent_id"], Value::Null);
}

#[tokio::test]
async fn structure_merges_root_pages_with_categories() {
    let app = TestApp::new().await;
    let (_, token) = app.user("admin", Role::Admin).await;

    app.post("/api/categories", &token, json!({"name": "C1"})).await;
    app.post("/api/categories", &token, json!({"name": "C2"})).await;
    app.post("/api/pages", &token, json!({"title": "P1"})).await;

    let tree = app.structure(&token).await;
    assert_eq!(titles(&tree), vec!["P1", "C1", "C2"]);
}

#[tokio::test]
async fn non_managers_cannot_reorder_structure() {
    let app = TestApp::new().await;
    let (_, admin) = app.user("admin", Role::Admin).await;
    let (_, reader) = app.user("reader", Role::User).await;

    let (_, c1) = app.post("/api/categories", &admin, json!({"name": "C1"})).await;
    let (_, p1) = app.post("/api/pages", &admin, json!({"title": "P1"})).await;
    let c1 = c1["id"].as_i64().unwrap();
    let p1 = p1["id"].as_i64().unwrap();

    let items = json!({"items": [
        {"id": c1, "type": "category", "order": 0},
        {"id": p1, "type": "page", "order": 1},
    ]});

    let (status, _) = app.post("/api/structure/reorder", &reader, items.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.order_of("categories", c1).await, 1);
    assert_eq!(app.order_of("pages", p1).await, 0);

    let (status, body) = app.post("/api/structure/reorder", &admin, items).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    assert_eq!(app.order_of("categories", c1).await, 0);
    assert_eq!(app.order_of("pages", p1).await, 1);
}

#[tokio::test]
async fn role_is_checked_before_the_reorder_body() {
    let app = TestApp::new().await;
    let (_, reader) = app.user("reader", Role::User).await;
    let (_, admin) = app.user("admin", Role::Admin).await;

    for uri in ["/api/structure/reorder", "/api/categories/reorder", "/api/pages/reorder"] {
        let (status, _) = app.post(uri, &reader, json!({"bogus": true})).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");

        let (status, _) = app.post(uri, &admin, json!({"bogus": true})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
    }
}

#[tokio::test]
async fn planned_move_round_trips_through_the_server() {
    let app = TestApp::new().await;
    let (_, token) = app.user("doc", Role::Documentaliste).await;

    app.post("/api/categories", &token, json!({"name": "C1"})).await;
    let (_, c2) = app.post("/api/categories", &token, json!({"name": "C2"})).await;
    app.post("/api/pages", &token, json!({"title": "P1"})).await;

    let tree = app.structure(&token).await;
    let c2 = c2["id"].as_i64().unwrap();
    let siblings = siblings_of(&tree, NodeKind::Category, c2).unwrap();
    let items = plan_move(siblings, NodeKind::Category, c2, Direction::Up).unwrap();

    let (status, _) = app
        .post("/api/structure/reorder", &token, json!({"items": items}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let tree = app.structure(&token).await;
    assert_eq!(titles(&tree), vec!["P1", "C2", "C1"]);
}

#[tokio::test]
async fn stale_sibling_view_overwrites_a_concurrent_move() {
    let app = TestApp::new().await;
    let (_, token) = app.user("admin", Role::Admin).await;

    app.post("/api/categories", &token, json!({"name": "A"})).await;
    app.post("/api/categories", &token, json!({"name": "B"})).await;
    app.post("/api/categories", &token, json!({"name": "C"})).await;

    // Two managers load the same tree.
    let view = app.structure(&token).await;
    let id_of = |title: &str| view.iter().find(|n| n.title == title).unwrap().id;

    let first = plan_move(&view, NodeKind::Category, id_of("B"), Direction::Up).unwrap();
    let second = plan_move(&view, NodeKind::Category, id_of("C"), Direction::Up).unwrap();

    app.post("/api/structure/reorder", &token, json!({"items": first})).await;
    app.post("/api/structure/reorder", &token, json!({"items": second})).await;

    // Last write wins for every sibling; the first move is lost.
    let tree = app.structure(&token).await;
    assert_eq!(titles(&tree), vec!["A", "C", "B"]);
}

#[tokio::test]
async fn single_table_reorder_rejects_unknown_ids() {
    let app = TestApp::new().await;
    let (_, token) = app.user("admin", Role::Admin).await;
    let (_, page) = app.post("/api/pages", &token, json!({"title": "P"})).await;
    let id = page["id"].as_i64().unwrap();

    let (status, body) = app
        .post(
            "/api/pages/reorder",
            &token,
            json!({"pages": [{"id": id, "order": 4}, {"id": 999, "order": 5}]}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["pages.1.id"].is_array());
    assert_eq!(app.order_of("pages", id).await, 0);

    let (status, _) = app
        .post("/api/pages/reorder", &token, json!({"pages": [{"id": id, "order": 4}]}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.order_of("pages", id).await, 4);
}

#[tokio::test]
async fn maintenance_mode_is_public_and_manager_controlled() {
    let app = TestApp::new().await;
    let (_, doc) = app.user("doc", Role::Documentaliste).await;
    let (_, reader) = app.user("reader", Role::User).await;

    let (status, body) = app.send(Method::GET, "/api/maintenance", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"maintenance": false, "message": ""}));

    let settings = json!({"settings": {"maintenance_mode": true, "maintenance_reason": "Upgrading"}});
    let (status, _) = app.post("/api/admin/settings", &reader, settings.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.post("/api/admin/settings", &doc, settings).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send(Method::GET, "/api/maintenance", None, None).await;
    assert_eq!(body, json!({"maintenance": true, "message": "Upgrading"}));

    let (_, stored) = app.get("/api/admin/settings", &doc).await;
    assert_eq!(stored["maintenance_mode"], "true");
}

#[tokio::test]
async fn tags_are_upper_cased_and_unique() {
    let app = TestApp::new().await;
    let (_, doc) = app.user("doc", Role::Documentaliste).await;
    let (_, reader) = app.user("reader", Role::User).await;

    let (status, tag) = app.post("/api/tags", &doc, json!({"name": "draft"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag["name"], "DRAFT");
    assert_eq!(tag["color"], "#6366f1");

    let (status, body) = app.post("/api/tags", &doc, json!({"name": "Draft"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["name"].is_array());

    let (status, _) = app.post("/api/tags", &reader, json!({"name": "x"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, tags) = app.get("/api/tags", &reader).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tags.as_array().unwrap().len(), 1);

    let (status, updated) = app
        .put(&format!("/api/tags/{}", tag["id"]), &doc, json!({"color": "#ff0000"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["color"], "#ff0000");
}

#[tokio::test]
async fn user_management_is_admin_only() {
    let app = TestApp::new().await;
    let (admin_id, admin) = app.user("admin", Role::Admin).await;
    let (_, doc) = app.user("doc", Role::Documentaliste).await;

    let (status, _) = app.get("/api/users", &doc).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            "/api/users",
            &admin,
            json!({"username": "new", "password": "short", "role": "user"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["password"].is_array());

    let (status, body) = app
        .post(
            "/api/users",
            &admin,
            json!({"username": "doc", "password": "long-enough", "role": "user"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["username"].is_array());

    let (status, _) = app.delete(&format!("/api/users/{admin_id}"), &admin).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, stats) = app.get("/api/admin/stats", &doc).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_users"], 2);
    assert_eq!(stats["admins_count"], 1);
    assert_eq!(stats["documentalistes_count"], 1);
    assert_eq!(stats["users_count"], 0);
}

#[tokio::test]
async fn role_changes_apply_to_live_tokens() {
    let app = TestApp::new().await;
    let (_, admin) = app.user("admin", Role::Admin).await;
    let (user_id, token) = app.user("promoted", Role::User).await;

    let (status, _) = app.post("/api/tags", &token, json!({"name": "x"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(&format!("/api/users/{user_id}"), &admin, json!({"role": "documentaliste"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "documentaliste");

    let (status, _) = app.post("/api/tags", &token, json!({"name": "x"})).await;
    assert_eq!(status, StatusCode::CREATED);
}
