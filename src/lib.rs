// ==========================================
// 商品导入对账引擎 - 核心库
// ==========================================
// 职责: 将扁平导入行同步到父实体（商品/目录节点）的关联集合
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 切块、对账、处理链
pub mod importer;

// 配置层 - 导入配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use config::{ConfigManager, ImportConfigReader, MapConfig};
pub use domain::{Chunk, Item, ListDomain, ListItem, ParentDomain, RefItem};
pub use importer::{ImportError, ImportJob, ImportReport, ImportResult, ProcessorChain};
pub use repository::{ImportRepository, SqliteImportRepository};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
