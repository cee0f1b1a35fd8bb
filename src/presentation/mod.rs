pub mod http;
pub mod routes;

use axum::Router;
use axum::extract::MatchedPath;
use ::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::bootstrap::app_context::AppContext;
use crate::bootstrap::config::Config;
use self::http::ApiDoc;

fn cors_layer(cfg: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);
    match cfg.frontend_url.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => base.allow_origin(origin),
        Some(Err(_)) => base.allow_origin(AllowOrigin::mirror_request()),
        // Production refuses to start without FRONTEND_URL; deny all if we get here anyway.
        None if cfg.is_production => base.allow_origin(AllowOrigin::exact(
            HeaderValue::from_static("http://invalid"),
        )),
        None => base.allow_origin(AllowOrigin::mirror_request()),
    }
}

/// The full HTTP surface: route-table views at the root, the data API and its
/// docs under `/api`, static bundles under `/assets`.
pub fn build_router(ctx: AppContext) -> Router {
    let api_router = Router::new()
        .nest("/api", http::health::routes(ctx.clone()))
        .nest("/api", http::documents::routes(ctx.clone()))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()));

    Router::new()
        .merge(http::views::routes(ctx.clone()))
        .merge(api_router)
        .nest_service("/assets", ServeDir::new(&ctx.cfg.assets_dir))
        .layer(cors_layer(&ctx.cfg))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                let matched = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                tracing::info_span!("http", %method, %uri, matched_path = %matched)
            }),
        )
}
