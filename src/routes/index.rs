use axum::{extract::State, response::Html};

use crate::AppState;

/// Landing page linking to the metrics and health endpoints.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let metrics: String = state
        .exporter
        .describe()
        .into_iter()
        .map(|desc| format!("<li><code>{}</code> {}</li>\n", desc.name, escape(desc.help)))
        .collect();

    Html(format!(
        r#"<html>
<head><title>Cursor Admin API Exporter</title></head>
<body>
<h1>Cursor Admin API Exporter</h1>
<p>Prometheus exporter for Cursor Admin API metrics.</p>
<ul>
<li><a href="{path}">Metrics</a></li>
<li><a href="/health">Health Check</a></li>
</ul>
<h2>Available Metrics</h2>
<ul>
{metrics}</ul>
</body>
</html>
"#,
        path = escape(&state.metrics_path),
    ))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
