// ==========================================
// 商品导入对账引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、批量写入
// 存储: config_kv 表 (key-value)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use crate::importer::error::{ImportError, ImportResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    /// 处理链顺序（JSON 数组或逗号分隔）
    pub const PROCESSORS: &str = "import/processors";
    /// 多值字段分隔符（单字符，默认换行）
    pub const SEPARATOR: &str = "import/separator";
    /// 每批处理行数
    pub const MAX_SIZE: &str = "import/max-size";
    /// 跳过的表头行数
    pub const SKIP_LINES: &str = "import/skip-lines";
    /// 本地媒体文件根目录
    pub const MEDIA_ROOT: &str = "import/media/root";
    /// CSV 列分隔符（单个 ASCII 字符，默认逗号）
    pub const CSV_DELIMITER: &str = "import/csv/delimiter";

    /// 字段映射: import/mapping/{name}（name 为 item 或处理器名）
    pub fn mapping(name: &str) -> String {
        format!("import/mapping/{}", name)
    }

    /// 作用域过滤: import/processor/{kind}/listtypes
    pub fn list_types(kind: &str) -> String {
        format!("import/processor/{}/listtypes", kind)
    }

    /// 已知被引用实体类型: import/processor/{kind}/types
    pub fn types(kind: &str) -> String {
        format!("import/processor/{}/types", kind)
    }
}

// ==========================================
// ConfigManager - 配置管理器（SQLite）
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ImportResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;
            configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值
    fn get_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;

        conn.query_row(
            "SELECT value FROM config_kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| ImportError::ConfigReadError {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// 写入单个配置值（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> ImportResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;

        conn.execute(
            "INSERT INTO config_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 JSON 对象批量写入配置
    ///
    /// # 参数
    /// - json: {"key": value, ...}；非字符串值按 JSON 文本存储
    ///
    /// # 返回
    /// - Ok(usize): 写入的配置项数量
    pub fn load_from_json(&self, json: &str) -> ImportResult<usize> {
        let config_map: HashMap<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| ImportError::ConfigValueError {
                key: "*".to_string(),
                value: String::new(),
                message: e.to_string(),
            })?;

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;

        let tx = conn.transaction()?;
        let mut count = 0;
        for (key, value) in config_map.iter() {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            count += tx.execute(
                "INSERT INTO config_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
                params![key, value],
            )?;
        }
        tx.commit()?;

        debug!(count = count, "配置已批量写入");
        Ok(count)
    }
}

impl ImportConfigReader for ConfigManager {
    fn get(&self, key: &str) -> ImportResult<Option<String>> {
        self.get_config_value(key)
    }
}

// ==========================================
// MapConfig - 内存配置
// ==========================================
// 用途: 测试与命令行（JSON 文件）
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式写入配置
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// 从 JSON 对象解析（非字符串值按 JSON 文本存储）
    pub fn from_json(json: &str) -> ImportResult<Self> {
        let raw: HashMap<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|e| ImportError::ConfigValueError {
                key: "*".to_string(),
                value: String::new(),
                message: e.to_string(),
            })?;

        let values = raw
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        Ok(Self { values })
    }
}

impl ImportConfigReader for MapConfig {
    fn get(&self, key: &str) -> ImportResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }
}
