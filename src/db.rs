// ==========================================
// 商品导入对账引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供导入所需表结构的建库脚本（幂等）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS type_item (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    domain TEXT NOT NULL,
    code TEXT NOT NULL,
    label TEXT NOT NULL,
    status INTEGER NOT NULL DEFAULT 1,
    UNIQUE(scope, domain, code)
);

CREATE TABLE IF NOT EXISTS item (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    code TEXT NOT NULL,
    label TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'default',
    status INTEGER NOT NULL DEFAULT 1,
    parentid INTEGER REFERENCES item(id) ON DELETE SET NULL,
    mtime TEXT NOT NULL,
    UNIQUE(domain, code)
);

CREATE TABLE IF NOT EXISTS ref_item (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    type TEXT NOT NULL,
    code TEXT,
    label TEXT NOT NULL,
    status INTEGER NOT NULL DEFAULT 1,
    data TEXT NOT NULL,
    mtime TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_ref_item_code
    ON ref_item(domain, type, code) WHERE code IS NOT NULL;

CREATE TABLE IF NOT EXISTS item_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parentid INTEGER NOT NULL REFERENCES item(id) ON DELETE CASCADE,
    domain TEXT NOT NULL,
    type TEXT NOT NULL,
    refid INTEGER NOT NULL,
    pos INTEGER NOT NULL DEFAULT 0,
    status INTEGER NOT NULL DEFAULT 1,
    datestart TEXT,
    dateend TEXT,
    config TEXT NOT NULL DEFAULT '{}',
    mtime TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_item_list_parent ON item_list(parentid, domain);

CREATE TABLE IF NOT EXISTS item_property (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parentid INTEGER NOT NULL REFERENCES item(id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    langid TEXT,
    value TEXT NOT NULL
);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化导入所需表结构（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
