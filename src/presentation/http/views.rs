use std::collections::BTreeMap;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use htmlescape::encode_minimal as escape_html;

use crate::bootstrap::app_context::AppContext;
use crate::presentation::routes::{RouteTarget, View};

/// One axum route per route-table entry, served with and without a trailing
/// slash. Paths outside the table are left to the router's default 404.
pub fn routes(ctx: AppContext) -> Router {
    let mut router = Router::new();
    for entry in ctx.routes().entries() {
        for path in served_paths(entry.pattern) {
            router = match entry.target {
                RouteTarget::Redirect(to) => {
                    router.route(&path, get(move || async move { Redirect::temporary(to) }))
                }
                RouteTarget::View(_) => router.route(&path, get(render_view)),
            };
        }
    }
    router.with_state(ctx)
}

fn served_paths(pattern: &str) -> Vec<String> {
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
        vec!["/".to_string()]
    } else {
        vec![trimmed.to_string(), format!("{trimmed}/")]
    }
}

async fn render_view(State(ctx): State<AppContext>, uri: Uri) -> Result<Response, StatusCode> {
    let matched = ctx.routes().resolve(uri.path()).ok_or(StatusCode::NOT_FOUND)?;
    let Some(view) = matched.view() else {
        return Err(StatusCode::NOT_FOUND);
    };
    let html = build_shell_html(view, matched.props(), ctx.cfg.assets_base_url.as_deref());
    Ok(with_cache_headers(Html(html)))
}

fn build_shell_html(
    view: View,
    props: Option<&BTreeMap<String, String>>,
    base: Option<&str>,
) -> String {
    let props_attr = match props {
        Some(p) => format!(
            " data-props=\"{}\"",
            escape_html(&serde_json::to_string(p).unwrap_or_else(|_| "{}".into()))
        ),
        None => String::new(),
    };
    let base = base.map(|b| b.trim_end_matches('/')).unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n<title>Kanban</title>\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n<link rel=\"stylesheet\" href=\"{base}/assets/app.css\" />\n</head>\n<body>\n<div id=\"app\" data-view=\"{view}\"{props}></div>\n<script type=\"module\" src=\"{base}/assets/app.js\"></script>\n</body>\n</html>\n",
        base = escape_html(base),
        view = escape_html(view.name()),
        props = props_attr,
    )
}

fn with_cache_headers(html: Html<String>) -> Response {
    let mut response = html.into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_both_slash_forms() {
        assert_eq!(served_paths("/"), vec!["/"]);
        assert_eq!(served_paths("/boards"), vec!["/boards", "/boards/"]);
        assert_eq!(served_paths("/board/:id"), vec!["/board/:id", "/board/:id/"]);
    }

    #[test]
    fn shell_carries_view_without_props() {
        let html = build_shell_html(View::BoardList, None, None);
        assert!(html.contains("data-view=\"board-list\""));
        assert!(!html.contains("data-props"));
        assert!(html.contains("src=\"/assets/app.js\""));
    }

    #[test]
    fn shell_escapes_props() {
        let mut props = BTreeMap::new();
        props.insert("id".to_string(), "<x\"y>".to_string());
        let html = build_shell_html(View::Board, Some(&props), Some("https://boards.example.com/"));
        assert!(html.contains("data-view=\"board\""));
        assert!(!html.contains("<x"));
        assert!(html.contains("&quot;id&quot;"));
        assert!(html.contains("&lt;x"));
        assert!(html.contains("data-props=\"{&quot;id&quot;:&quot;&lt;x"));
        assert!(html.contains("href=\"https://boards.example.com/assets/app.css\""));
    }
}
