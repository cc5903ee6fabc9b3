// ==========================================
// 商品导入对账引擎 - 领域模型层
// ==========================================
// 职责: 定义父实体、关联、被引用实体、切块类型
// 红线: 不含数据访问逻辑,不含对账逻辑
// ==========================================

pub mod chunk;
pub mod item;
pub mod types;

// 重导出核心类型
pub use chunk::{Chunk, FieldMapping, NaturalKey, RawRow, TypeRequest};
pub use item::{
    AttributeItem, Item, ListItem, MediaItem, PriceItem, PropertyItem, RefItem, TextItem,
};
pub use types::{ListDomain, ParentDomain, LABEL_MAX_LEN, STATUS_ENABLED};
