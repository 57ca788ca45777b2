//! View rendering seam for the site and admin surfaces.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::{auth::SessionUser, config::AppConfig, error::ForumError};

/// PageHeader
///
/// Header data attached by `build_header`/`admin_build_header` and handed to the renderer
/// with every page.
#[derive(Debug, Clone, Serialize)]
pub struct PageHeader {
    pub relative_path: String,
    pub site_title: String,
    pub user: Option<SessionUser>,
    pub admin: bool,
}

impl PageHeader {
    pub fn new(config: &AppConfig, user: Option<SessionUser>, admin: bool) -> Self {
        Self {
            relative_path: config.relative_path.clone(),
            site_title: config.site_title.clone(),
            user,
            admin,
        }
    }
}

/// ViewRenderer
///
/// Turns a controller's data into an HTML document using the named template.
pub trait ViewRenderer: Send + Sync {
    fn render(&self, template: &str, data: &Value, header: &PageHeader) -> Result<String, ForumError>;
}

pub type ViewState = Arc<dyn ViewRenderer>;

/// EmbeddedJsonRenderer
///
/// Minimal renderer for running without a template engine: emits a shell document with
/// the page data embedded as JSON for the client-side templates to pick up.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedJsonRenderer;

impl ViewRenderer for EmbeddedJsonRenderer {
    fn render(&self, template: &str, data: &Value, header: &PageHeader) -> Result<String, ForumError> {
        let payload = serde_json::to_string(data)
            .map_err(|e| ForumError::Internal(e.to_string()))?
            // Keep "</script>" inside string values from closing the tag.
            .replace("</", "<\\/");
        let stylesheet = if header.admin { "admin.css" } else { "stylesheet.css" };

        Ok(format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n\
             <link rel=\"stylesheet\" href=\"{base}/{stylesheet}\">\n</head>\n\
             <body data-template=\"{template}\">\n\
             <script id=\"ajaxify-data\" type=\"application/json\">{payload}</script>\n\
             </body>\n</html>\n",
            title = escape_html(&header.site_title),
            base = escape_html(&header.relative_path),
            template = escape_html(template),
        ))
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
