// ==========================================
// 通用记录引擎 - 数据清洗器实现
// ==========================================
// 职责: TRIM / NULL 标准化 / 布尔标记标准化
// ==========================================

/// 视为"真"的布尔标记（比较前统一转小写）
pub const TRUTHY_FLAGS: [&str; 4] = ["true", "1", "yes", "是"];

pub struct DataCleaner;

impl DataCleaner {
    pub fn clean_text(&self, value: &str) -> String {
        value.trim().to_string()
    }

    /// 标准化 NULL 值（空字符串/空白 → None）
    pub fn normalize_null(&self, value: Option<&str>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    /// 布尔标记: true/1/yes/是 为真（大小写不敏感），其余一律为假
    pub fn clean_bool_flag(&self, value: &str) -> bool {
        let lower = value.trim().to_lowercase();
        TRUTHY_FLAGS.contains(&lower.as_str())
    }
}
