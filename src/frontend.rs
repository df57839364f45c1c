//! 嵌入式页面模板与静态资源服务。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::response::{Html, IntoResponse, Response};
use rust_embed::RustEmbed;
use tracing::error;

use crate::auth::CurrentUser;
use crate::error::ApiError;

const USERNAME_SLOT: &str = "{{username}}";
const ERROR_SLOT: &str = "{{error}}";

#[derive(RustEmbed)]
#[folder = "frontend"]
/// 嵌入式前端页面与资源。
pub struct FrontendAssets;

fn load_template(name: &str) -> String {
    match FrontendAssets::get(name) {
        Some(asset) => String::from_utf8_lossy(&asset.data).into_owned(),
        None => {
            error!(template = name, "embedded template missing");
            String::new()
        }
    }
}

/// 渲染登录页，可选附带错误提示。
pub fn render_login(message: Option<&str>) -> String {
    let notice = message
        .map(|msg| {
            format!(
                r#"<p class="error">{}</p>"#,
                html_escape::encode_text(msg)
            )
        })
        .unwrap_or_default();
    load_template("login.html").replace(ERROR_SLOT, &notice)
}

/// 渲染上传首页。
pub fn render_index(username: &str) -> String {
    load_template("index.html").replace(USERNAME_SLOT, &html_escape::encode_text(username))
}

pub async fn index_page(Extension(CurrentUser(username)): Extension<CurrentUser>) -> Html<String> {
    Html(render_index(&username))
}

/// 静态资源回退处理器：仅开放 `static/` 目录下的资源。
pub async fn serve_static(req: Request<AxumBody>) -> Result<Response, ApiError> {
    let path = req.uri().path().trim_start_matches('/');
    if path.starts_with("static/")
        && let Some(response) = load_embedded_asset(path)?
    {
        return Ok(response);
    }
    Err(ApiError::NotFound("Not found".into()))
}

fn load_embedded_asset(path: &str) -> Result<Option<Response>, ApiError> {
    let Some(asset) = FrontendAssets::get(path) else {
        return Ok(None);
    };
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
    );
    Ok(Some(
        (headers, AxumBody::from(asset.data.into_owned())).into_response(),
    ))
}
