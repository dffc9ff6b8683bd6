//! Root probe handler

use axum::response::Html;

pub const WELCOME_HTML: &str = "<h1>Welcome to the Heart Disease Prediction API</h1>";

pub async fn welcome() -> Html<&'static str> {
    Html(WELCOME_HTML)
}
