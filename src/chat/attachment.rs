//! 附件校验与暂存
//!
//! 发送前对用户选择的文件做客户端侧校验：单文件大小上限 10 MiB，
//! 类型白名单过滤，批次内合规文件保留、超限文件汇总提示

use serde::Serialize;
use tracing::{debug, warn};

/// 单个附件的大小上限（10 MiB）
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// 允许上传的 MIME 类型白名单
pub const ALLOWED_MIME_TYPES: [&str; 11] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "application/zip",
];

/// 附件的渲染分类（由 MIME 类型推导，客户端不解析文件内容）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
    Document,
    Spreadsheet,
    Text,
    Archive,
    Other,
}

impl AttachmentKind {
    pub fn from_mimetype(mimetype: &str) -> Self {
        if mimetype.starts_with("image/") {
            return AttachmentKind::Image;
        }
        match mimetype {
            "application/pdf" => AttachmentKind::Pdf,
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                AttachmentKind::Document
            }
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                AttachmentKind::Spreadsheet
            }
            "text/plain" => AttachmentKind::Text,
            "application/zip" => AttachmentKind::Archive,
            _ => AttachmentKind::Other,
        }
    }
}

/// 文件大小的展示格式（B / KB / MB）
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// 待发送附件：内存中的文件内容 + 元信息
/// 图片会生成 data URL 预览，其他类型不做预览
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAttachment {
    pub originalname: String,
    pub mimetype: String,
    pub size: u64,
    /// 图片的 data URL 预览（非图片为 None）
    pub preview: Option<String>,
    pub bytes: Vec<u8>,
}

impl PendingAttachment {
    pub fn from_bytes(
        originalname: impl Into<String>,
        mimetype: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        use base64::Engine;

        let originalname = originalname.into();
        let mimetype = mimetype.into();
        let size = bytes.len() as u64;

        // 仅为图片生成 data URL 预览
        let preview = if mimetype.starts_with("image/") {
            Some(format!(
                "data:{};base64,{}",
                mimetype,
                base64::engine::general_purpose::STANDARD.encode(&bytes)
            ))
        } else {
            None
        };

        Self {
            originalname,
            mimetype,
            size,
            preview,
            bytes,
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::from_mimetype(&self.mimetype)
    }
}

/// 一批文件的校验结果
///
/// 合规文件进入 `accepted`，超限和类型不支持的文件只记录文件名，
/// 供上层生成一次性的汇总提示
#[derive(Debug, Default)]
pub struct BatchReview {
    pub accepted: Vec<PendingAttachment>,
    pub oversized: Vec<String>,
    pub unsupported: Vec<String>,
}

impl BatchReview {
    /// 汇总警告文案（整批一条，不逐文件弹提示）
    pub fn warning(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.oversized.is_empty() {
            parts.push(format!(
                "These files exceed the 10 MB limit: {}",
                self.oversized.join(", ")
            ));
        }
        if !self.unsupported.is_empty() {
            parts.push(format!(
                "Unsupported file type: {}",
                self.unsupported.join(", ")
            ));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// 附件暂存区
///
/// 新批次与已暂存文件取并集；按下标移除时保持其余文件的相对顺序
#[derive(Debug, Default)]
pub struct AttachmentTray {
    items: Vec<PendingAttachment>,
}

impl AttachmentTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验一批文件：超限 / 类型不支持的分拣出来，合规的保留
    pub fn review_batch(files: Vec<PendingAttachment>) -> BatchReview {
        let mut review = BatchReview::default();
        for file in files {
            if !ALLOWED_MIME_TYPES.contains(&file.mimetype.as_str()) {
                debug!(
                    "[Attach] 类型不支持: {} ({})",
                    file.originalname, file.mimetype
                );
                review.unsupported.push(file.originalname);
            } else if file.size > MAX_ATTACHMENT_BYTES {
                debug!(
                    "[Attach] 超过大小上限: {} ({})",
                    file.originalname,
                    format_file_size(file.size)
                );
                review.oversized.push(file.originalname);
            } else {
                review.accepted.push(file);
            }
        }
        review
    }

    /// 校验并追加一批文件，返回校验结果供上层提示
    /// 合规文件直接并入暂存区，返回值里的 `accepted` 会被清空
    pub fn add_batch(&mut self, files: Vec<PendingAttachment>) -> BatchReview {
        let mut review = Self::review_batch(files);
        if !review.oversized.is_empty() || !review.unsupported.is_empty() {
            warn!(
                "[Attach] 本批文件被拒 {} 个（超限 {} 个，类型不支持 {} 个）",
                review.oversized.len() + review.unsupported.len(),
                review.oversized.len(),
                review.unsupported.len()
            );
        }
        self.items.append(&mut review.accepted);
        review
    }

    /// 按下标移除附件，越界时返回 None
    pub fn remove(&mut self, index: usize) -> Option<PendingAttachment> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn take_all(&mut self) -> Vec<PendingAttachment> {
        std::mem::take(&mut self.items)
    }

    pub fn items(&self) -> &[PendingAttachment] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
