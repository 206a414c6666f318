use serde::Deserialize;
use std::fmt;

/// 后端统一的错误响应体（`{ "message": "..." }`）
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

/// 带 HTTP 状态码的请求失败错误
/// 调用方可以通过 downcast 判断 404（会话不存在）、401/403（登录过期）等分类
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status}: {message}")]
pub struct HttpFailure {
    pub status: u16,
    pub message: String,
}

/// 判断错误是否为 404（资源不存在）
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<HttpFailure>(), Some(f) if f.status == 404)
}

/// 判断错误是否为登录过期（401/403）
pub fn is_auth_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<HttpFailure>(),
        Some(f) if f.status == 401 || f.status == 403
    )
}

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Buyer,
    Seller,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Buyer => "buyer",
            UserRole::Seller => "seller",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通用 HTTP 响应处理函数：成功时直接反序列化响应体为 `T`
/// 后端成功时返回载荷本身，失败时返回 `{ "message": "..." }` 加 HTTP 状态码，
/// 因此这里按状态码分类错误，所有 API 都可以共用此方法
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    use anyhow::Context;
    use tracing::{debug, error};

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);

    if !status.is_success() {
        // 失败响应体是 { "message": "..." }，解析失败时退回原始文本
        let message = serde_json::from_slice::<ApiErrorBody>(&body_bytes)
            .map(|b| b.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body_str.to_string());
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 错误信息: {}",
            operation_name, status, message
        );
        return Err(anyhow::Error::new(HttpFailure {
            status: status.as_u16(),
            message,
        }));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    // 从 bytes 反序列化（因为 body 已经被消费了）
    let payload: T = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    Ok(payload)
}
