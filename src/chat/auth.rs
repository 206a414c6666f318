use crate::chat::types::{handle_http_response, UserRole};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: LoginUser,
}

#[derive(Debug, Deserialize)]
pub struct LoginUser {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "userType")]
    pub user_type: UserRole,
}

/// 登录会话：持有身份信息和 Bearer token
/// 由调用方显式传给客户端，token 不做任何全局共享，随会话对象一起销毁
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub role: UserRole,
    pub token: String,
}

impl Session {
    pub fn from_login(resp: LoginResponse) -> Self {
        Self {
            user_id: resp.user.user_id,
            display_name: resp.user.name,
            role: resp.user.user_type,
            token: resp.token,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// 登录并返回会话对象
pub async fn login_async(api_base_url: &str, email: &str, password: &str) -> anyhow::Result<Session> {
    use anyhow::Context;
    use uuid::Uuid;

    let client = reqwest::Client::new();
    let request_id = Uuid::new_v4().to_string();

    let login_req = LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    };

    let url = format!("{}/api/users/login", api_base_url);

    info!("🔐 正在登录...");
    debug!("   URL: {}", url);
    debug!("   邮箱: {}", login_req.email);
    debug!("   请求ID: {}", request_id);

    let response = client
        .post(&url)
        .header("Accept", "application/json")
        .header("x-request-id", &request_id)
        .json(&login_req)
        .send()
        .await
        .context("登录请求失败")?;

    let login_resp = handle_http_response::<LoginResponse>(response, "登录").await?;
    let session = Session::from_login(login_resp);

    info!(
        "✅ 登录成功，用户: {} ({})",
        session.display_name, session.role
    );

    Ok(session)
}
