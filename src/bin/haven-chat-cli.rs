//! Thrift Haven 聊天 CLI 客户端（测试版）
//!
//! 非交互式 CLI，用于测试和展示聊天功能
//! 启动时通过命令行参数指定账号，自动登录，可选发送一条消息（含附件），
//! 随后持续展示轮询回调

use anyhow::Result;
use clap::Parser;
use haven_chat_core::chat::badge::BadgeListener;
use haven_chat_core::chat::client::{ClientConfig, HavenChatClient};
use haven_chat_core::chat::message::ChatListener;
use haven_chat_core::{login_async, PendingAttachment};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Thrift Haven 聊天 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "haven-chat-cli")]
#[command(about = "Thrift Haven 聊天 CLI 客户端 - 用于测试和展示聊天功能", long_about = None)]
struct Args {
    /// 后端 API 基础地址
    #[arg(short, long, default_value = "http://localhost:5000")]
    server: String,

    /// 登录邮箱（默认: 本地种子管理员）
    #[arg(short, long, default_value = "admin@thrifthaven.com")]
    email: String,

    /// 登录密码（默认: 本地种子密码）
    #[arg(short, long, default_value = "admin123")]
    password: String,

    /// 管理员要聊天的对象用户 ID（配合 --to-user-type）
    #[arg(long)]
    to_user: Option<String>,

    /// 对象用户类型（buyer 或 seller）
    #[arg(long, default_value = "seller")]
    to_user_type: String,

    /// 启动后发送的一条消息正文
    #[arg(short, long)]
    message: Option<String>,

    /// 随消息一起发送的附件路径（可重复）
    #[arg(long)]
    attach: Vec<PathBuf>,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 日志级别（默认: info,haven_chat_core=debug）
    #[arg(long, default_value = "info,haven_chat_core=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("haven-chat.log")
        .expect("无法创建日志文件 haven-chat.log");

    // 输出到 stdout（控制台），保留 ANSI 颜色代码用于终端显示
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 输出到文件，禁用 ANSI 颜色代码（文件不需要颜色）
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: haven-chat.log");
}

/// 按扩展名推断上传 MIME 类型
fn mimetype_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// 设置监听器（输出所有接收到的回调）
fn setup_listeners(client: &mut HavenChatClient) {
    // 聊天监听器
    struct CliChatListener;
    #[async_trait::async_trait]
    impl ChatListener for CliChatListener {
        async fn on_conversation_ready(&self, conversation: String) {
            info!("[CLI/Chat] 🔗 会话就绪: {}", conversation);
        }

        async fn on_message_list_changed(&self, message_list: String) {
            info!("[CLI/Chat] 🔄 消息列表变更: {}", message_list);
        }

        async fn on_send_progress(&self, local_id: i64, progress: i32) {
            info!("[CLI/Chat] 📊 上传进度: localId={} {}%", local_id, progress);
        }

        async fn on_send_failed(&self, local_id: i64, reason: String) {
            error!("[CLI/Chat] ❌ 发送失败: localId={} 原因: {}", local_id, reason);
        }

        async fn on_attachments_rejected(&self, warning: String) {
            warn!("[CLI/Chat] ⚠️ 附件被拒: {}", warning);
        }

        async fn on_unread_count_changed(&self, count: i64) {
            info!("[CLI/Chat] 📬 未读数变更: {}", count);
        }

        async fn on_chat_users_changed(&self, user_list: String) {
            info!("[CLI/Chat] 👥 聊天用户目录变更: {}", user_list);
        }

        async fn on_auth_expired(&self) {
            error!("[CLI/Chat] ⚠️ 凭证失效，请重新登录");
        }
    }
    client.set_chat_listener(Arc::new(CliChatListener));

    // 徽标监听器（仅管理员会收到回调）
    struct CliBadgeListener;
    #[async_trait::async_trait]
    impl BadgeListener for CliBadgeListener {
        async fn on_counts_changed(&self, snapshot: String) {
            info!("[CLI/Badge] 📊 通知计数变更: {}", snapshot);
        }

        async fn on_badge_total_changed(&self, total: i64) {
            info!("[CLI/Badge] 🔔 徽标值变更: {}", total);
        }
    }
    client.set_badge_listener(Arc::new(CliBadgeListener));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    init_logger(&args.log_level);

    info!("[CLI] 🚀 Thrift Haven 聊天 CLI 客户端（测试模式）");
    info!("[CLI] 🌐 服务器: {}", args.server);
    info!("[CLI] 📧 账号: {}", args.email);
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    // 登录
    info!("[CLI] 🔐 正在登录...");
    let session = login_async(&args.server, &args.email, &args.password)
        .await
        .map_err(|e| anyhow::anyhow!("登录失败: {}", e))?;
    info!(
        "[CLI] ✅ 登录成功！用户: {} ({})",
        session.display_name, session.role
    );
    let is_admin = session.is_admin();

    // 创建客户端
    let config = ClientConfig::new(args.server.clone());
    let mut client = HavenChatClient::new(config, session);

    // 设置监听器
    setup_listeners(&mut client);

    // 启动（非管理员会自动解析自己与管理员的会话）
    info!("[CLI] 🔗 正在启动客户端...");
    client
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("启动失败: {}", e))?;
    info!("[CLI] ✅ 客户端已启动！");

    // 显示初始信息
    if is_admin {
        if let Ok(users) = client.refresh_chat_users().await {
            info!("[CLI] 📋 聊天用户（共 {} 个）:", users.len());
            for user in users.iter().take(5) {
                info!(
                    "[CLI]   - {} ({}) | 未读: {}",
                    user.name, user.user_type, user.unread_count
                );
            }
        }
    } else if let Ok(Some(conversation)) = client.current_conversation().await {
        info!("[CLI] 💬 当前会话: {}", conversation.conversation_id);
    } else {
        info!("[CLI] 💡 尚无会话，发送的消息会先本地排队");
    }

    // 管理员可通过参数直接指定聊天对象
    if let Some(to_user) = &args.to_user {
        info!("[CLI] 💬 开启与用户 {} 的会话...", to_user);
        match client
            .open_conversation_with(to_user, &args.to_user_type)
            .await
        {
            Ok(conversation) => info!("[CLI] ✅ 会话: {}", conversation.conversation_id),
            Err(e) => error!("[CLI] ❌ 开启会话失败: {}", e),
        }
    }

    // 可选：发送一条消息（含附件）
    if args.message.is_some() || !args.attach.is_empty() {
        for path in &args.attach {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| anyhow::anyhow!("读取附件 {} 失败: {}", path.display(), e))?;
            let name = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("attachment.bin");
            let total = client
                .add_attachments(vec![PendingAttachment::from_bytes(
                    name,
                    mimetype_for(path),
                    bytes,
                )])
                .await?;
            info!("[CLI] 📎 已附加 {}（当前共 {} 个附件）", name, total);
        }

        if let Some(message) = &args.message {
            client.set_draft(message).await?;
        }

        info!("[CLI] 📤 发送消息...");
        if let Err(e) = client.send_message().await {
            error!("[CLI] ❌ 发送失败: {}", e);
        }

        // 按日期分组展示当前列表
        if let Ok(groups) = client.day_groups().await {
            for group in &groups {
                info!("[CLI] 📅 {}（{} 条）", group.date, group.messages.len());
                for message in &group.messages {
                    info!("[CLI]   - {}", message.message_text());
                }
            }
        }
    }

    info!("[CLI] 📥 开始监听回调...");
    info!("[CLI] 💡 提示：程序将持续运行并显示轮询产生的所有事件");
    if args.duration > 0 {
        info!("[CLI] ⏰ {} 秒后自动退出", args.duration);
        sleep(Duration::from_secs(args.duration)).await;
        client.shutdown();
        info!("[CLI] 👋 程序退出");
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        // 持续运行直到被中断
        loop {
            sleep(Duration::from_secs(3600)).await;
        }
    }

    Ok(())
}
