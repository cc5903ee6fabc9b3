// ==========================================
// 商品导入对账引擎 - 配置层
// ==========================================
// 职责: 导入配置读取（作用域过滤、分隔符、字段映射、处理链）
// 存储: config_kv 表 / 内存
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, MapConfig};
pub use import_config_trait::ImportConfigReader;
