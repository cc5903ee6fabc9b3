// ==========================================
// 商品导入对账引擎 - 关联域实现
// ==========================================
// 职责: 各关联域的自然键、默认值、字段填充
// 关联类: text / media / price / attribute / catalog / product / supplier
// 非关联: property（父实体属性）
// ==========================================

pub mod attribute;
pub mod link;
pub mod media;
pub mod price;
pub mod property;
pub mod text;

pub use attribute::AttributeKind;
pub use link::LinkKind;
pub use media::MediaKind;
pub use price::PriceKind;
pub use property::{PropertyReconciler, PropertySettings};
pub use text::TextKind;

use crate::domain::Chunk;
use crate::importer::error::ImportResult;
use crate::importer::list_reconciler::{field, parse_status};

/// 可选字段（裁剪后非空）
pub(crate) fn opt(chunk: &Chunk, key: &str) -> Option<String> {
    chunk.get(key).map(str::to_string)
}

/// 块中出现则覆写可选字段（空白置为 None）
pub(crate) fn overwrite_opt(target: &mut Option<String>, chunk: &Chunk, key: &str) {
    if let Some(value) = field(chunk, key) {
        *target = value;
    }
}

/// 块中出现且非空则覆写字符串字段
pub(crate) fn overwrite(target: &mut String, chunk: &Chunk, key: &str) {
    if let Some(value) = chunk.get(key) {
        *target = value.to_string();
    }
}

/// 块中出现则覆写状态
pub(crate) fn overwrite_status(target: &mut i32, chunk: &Chunk, key: &str) -> ImportResult<()> {
    if let Some(status) = parse_status(chunk, key)? {
        *target = status;
    }
    Ok(())
}
