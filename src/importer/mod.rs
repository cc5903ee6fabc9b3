// ==========================================
// 商品导入对账引擎 - 导入层
// ==========================================
// 职责: 源文件行 → 切块 → 处理链对账 → 父实体保存
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod code_cache;
pub mod error;
pub mod field_chunker;
pub mod file_parser;
pub mod import_job;
pub mod kinds;
pub mod list_reconciler;
pub mod processor;
pub mod type_registry;

// 重导出核心类型
pub use code_cache::CodeCache;
pub use error::{ImportError, ImportResult};
pub use field_chunker::{chunk, parse_separator, peek_chunks, split_values, DEFAULT_SEPARATOR};
pub use file_parser::{parse_delimiter, CsvReader, ExcelReader, SourceReader, UniversalReader};
pub use import_job::{ImportJob, ImportReport};
pub use list_reconciler::{ListKind, ListReconciler, ListSettings, ReconcileStats, RefTypeSpec};
pub use processor::{
    factory, Done, ListProcessor, Processor, ProcessorChain, ProcessorContext, PROCESSOR_NAMES,
};
pub use type_registry::{FlushReport, TypeRegistry};
