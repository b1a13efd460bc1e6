use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::auth::{auth_middleware, manager_middleware};
use crate::handlers::{
    admin as admin_handlers, auth as auth_handlers, categories as category_handlers,
    pages as page_handlers, settings as settings_handlers, structure as structure_handlers,
    tags as tag_handlers, users as user_handlers,
};
use crate::{Config, DbPool};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
}

pub fn create_router(db: DbPool, config: Config) -> Router {
    let state = AppState { db, config };

    // Reachable without a token, also during maintenance
    let public_routes = Router::new()
        .route("/login", post(auth_handlers::login))
        .route("/maintenance", get(settings_handlers::maintenance_status));

    let user_routes = Router::new()
        .route(
            "/",
            get(user_handlers::list_users).post(user_handlers::create_user),
        )
        .route(
            "/:id",
            get(user_handlers::get_user)
                .put(user_handlers::update_user)
                .patch(user_handlers::update_user)
                .delete(user_handlers::delete_user),
        );

    // `/reorder` is matched before `/:id`
    let page_routes = Router::new()
        .route(
            "/",
            get(page_handlers::list_pages).post(page_handlers::create_page),
        )
        .route(
            "/reorder",
            post(page_handlers::reorder_pages).route_layer(middleware::from_fn(manager_middleware)),
        )
        .route(
            "/:id",
            get(page_handlers::get_page)
                .put(page_handlers::update_page)
                .patch(page_handlers::update_page)
                .delete(page_handlers::delete_page),
        );

    let category_routes = Router::new()
        .route(
            "/",
            get(category_handlers::list_categories).post(category_handlers::create_category),
        )
        .route(
            "/reorder",
            post(category_handlers::reorder_categories)
                .route_layer(middleware::from_fn(manager_middleware)),
        )
        .route(
            "/:id",
            get(category_handlers::get_category)
                .put(category_handlers::update_category)
                .patch(category_handlers::update_category)
                .delete(category_handlers::delete_category),
        );

    let tag_routes = Router::new()
        .route(
            "/",
            get(tag_handlers::list_tags).post(tag_handlers::create_tag),
        )
        .route(
            "/:id",
            put(tag_handlers::update_tag)
                .patch(tag_handlers::update_tag)
                .delete(tag_handlers::delete_tag),
        );

    let admin_routes = Router::new()
        .route("/stats", get(admin_handlers::stats))
        .route(
            "/settings",
            get(settings_handlers::get_settings).post(settings_handlers::update_settings),
        );

    let protected_routes = Router::new()
        .route("/logout", post(auth_handlers::logout))
        .route("/user", get(auth_handlers::me))
        .route(
            "/structure/reorder",
            post(structure_handlers::reorder_structure)
                .route_layer(middleware::from_fn(manager_middleware)),
        )
        .nest("/users", user_routes)
        .nest("/pages", page_routes)
        .nest("/categories", category_routes)
        .nest("/tags", tag_routes)
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new().merge(public_routes).merge(protected_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
