// ==========================================
// 商品导入对账引擎 - 导入 Repository 实现
// ==========================================
// 职责: 实现导入相关数据访问（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::{configure_sqlite_connection, init_schema};
use crate::domain::{
    AttributeItem, Item, ListDomain, ListItem, ParentDomain, PropertyItem, RefItem, TypeRequest,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_repo::{ItemRepository, RefRepository, TypeRepository};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// 生成 SQL 占位符列表（?start, ?start+1, ...）
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 在事务中按 ID 批量删除（表名仅限内部固定值）
fn delete_by_ids(tx: &Transaction, table: &str, ids: &[i64]) -> RepositoryResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM {} WHERE id IN ({})",
        table,
        placeholders(1, ids.len())
    );
    Ok(tx.execute(&sql, params_from_iter(ids.iter()))?)
}

/// 写入被引用实体（新建时返回新 ID）
fn upsert_ref_item(tx: &Transaction, ref_item: &mut RefItem, now: &str) -> RepositoryResult<i64> {
    let data = serde_json::to_string(&*ref_item)?;
    let domain = ref_item.domain().as_str();
    let code = ref_item.code().map(str::to_string);

    match ref_item.id() {
        Some(id) => {
            tx.execute(
                r#"
                UPDATE ref_item
                SET domain = ?2, type = ?3, code = ?4, label = ?5, status = ?6, data = ?7, mtime = ?8
                WHERE id = ?1
                "#,
                params![
                    id,
                    domain,
                    ref_item.type_code(),
                    code,
                    ref_item.label(),
                    ref_item.status(),
                    data,
                    now
                ],
            )?;
            Ok(id)
        }
        None => {
            tx.execute(
                r#"
                INSERT INTO ref_item (domain, type, code, label, status, data, mtime)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    domain,
                    ref_item.type_code(),
                    code,
                    ref_item.label(),
                    ref_item.status(),
                    data,
                    now
                ],
            )?;
            let id = tx.last_insert_rowid();
            ref_item.set_id(id);
            Ok(id)
        }
    }
}

/// 链接目标所在的父实体域（仅目录/商品/供应商）
fn link_domain(domain: ListDomain) -> RepositoryResult<&'static str> {
    match domain {
        ListDomain::Catalog | ListDomain::Product | ListDomain::Supplier => Ok(domain.as_str()),
        other => Err(RepositoryError::ValidationError(format!(
            "关联域 {} 不是链接目标",
            other
        ))),
    }
}

// ==========================================
// SqliteImportRepository
// ==========================================
pub struct SqliteImportRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportRepository {
    /// 创建新的 Repository 实例（自动初始化表结构）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（":memory:" 为内存库）
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = Connection::open(db_path)?;
        configure_sqlite_connection(&conn)?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
            init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 共享底层连接（供配置管理器复用）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入链接目标主数据（目录/商品/供应商），已存在时返回原 ID
    pub fn save_link_target(
        &self,
        domain: ListDomain,
        code: &str,
        label: &str,
    ) -> RepositoryResult<i64> {
        let domain = link_domain(domain)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO item (domain, code, label, type, status, mtime)
            VALUES (?1, ?2, ?3, 'default', 1, ?4)
            "#,
            params![domain, code, label, Utc::now().to_rfc3339()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM item WHERE domain = ?1 AND code = ?2",
            params![domain, code],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// 加载父实体的关联与被引用实体
    fn load_lists(
        conn: &Connection,
        parent_ids: &[i64],
    ) -> RepositoryResult<Vec<(i64, ListItem)>> {
        let sql = format!(
            r#"
            SELECT id, parentid, domain, type, refid, pos, status, datestart, dateend, config
            FROM item_list
            WHERE parentid IN ({})
            ORDER BY parentid, pos, id
            "#,
            placeholders(1, parent_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(parent_ids.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, i32>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut lists = Vec::with_capacity(rows.len());
        for (id, parent_id, domain, type_code, ref_id, pos, status, start, end, config) in rows {
            let domain = domain
                .parse::<ListDomain>()
                .map_err(RepositoryError::ValidationError)?;
            let config: BTreeMap<String, String> = serde_json::from_str(&config)?;

            let mut list = ListItem::new(domain, type_code);
            list.id = Some(id);
            list.ref_id = Some(ref_id);
            list.position = pos;
            list.status = status;
            list.date_start = start;
            list.date_end = end;
            list.config = config;
            lists.push((parent_id, list));
        }

        // 被引用实体（独占实体 + 共享属性）
        let ref_ids: Vec<i64> = lists
            .iter()
            .filter(|(_, li)| li.domain.owns_ref() || li.domain == ListDomain::Attribute)
            .filter_map(|(_, li)| li.ref_id)
            .collect();
        let refs = Self::load_ref_items(conn, &ref_ids)?;
        for (_, list) in lists.iter_mut() {
            if let Some(ref_item) = list.ref_id.and_then(|id| refs.get(&id)) {
                list.ref_item = Some(ref_item.clone());
            }
        }

        Ok(lists)
    }

    fn load_ref_items(conn: &Connection, ids: &[i64]) -> RepositoryResult<HashMap<i64, RefItem>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT id, data FROM ref_item WHERE id IN ({})",
            placeholders(1, ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut refs = HashMap::with_capacity(rows.len());
        for (id, data) in rows {
            let mut ref_item: RefItem = serde_json::from_str(&data)?;
            ref_item.set_id(id);
            refs.insert(id, ref_item);
        }
        Ok(refs)
    }

    fn load_properties(
        conn: &Connection,
        parent_ids: &[i64],
    ) -> RepositoryResult<Vec<(i64, PropertyItem)>> {
        let sql = format!(
            "SELECT id, parentid, type, langid, value FROM item_property WHERE parentid IN ({}) ORDER BY id",
            placeholders(1, parent_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(parent_ids.iter()), |row| {
                Ok((
                    row.get::<_, i64>(1)?,
                    PropertyItem {
                        id: Some(row.get(0)?),
                        type_code: row.get(2)?,
                        language_id: row.get(3)?,
                        value: row.get(4)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl TypeRepository for SqliteImportRepository {
    fn search_type_codes(
        &self,
        scope: &str,
        domains: &[String],
    ) -> RepositoryResult<Vec<(String, String)>> {
        if domains.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT domain, code FROM type_item WHERE scope = ?1 AND domain IN ({}) ORDER BY domain, code",
            placeholders(2, domains.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let args = std::iter::once(scope.to_string()).chain(domains.iter().cloned());
        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn save_types(&self, scope: &str, types: &[TypeRequest]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "INSERT INTO type_item (scope, domain, code, label, status) VALUES (?1, ?2, ?3, ?4, 1)",
        )?;

        let mut count = 0;
        for request in types {
            count += stmt.execute(params![scope, request.domain, request.code, request.code])?;
        }
        debug!(scope = %scope, count = count, "类型编码已写入");
        Ok(count)
    }

    fn begin(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn commit(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch("COMMIT")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn rollback(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch("ROLLBACK")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }
}

impl ItemRepository for SqliteImportRepository {
    fn find_items(&self, domain: ParentDomain, codes: &[String]) -> RepositoryResult<Vec<Item>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;

        let sql = format!(
            "SELECT id, code, label, type, status, parentid FROM item WHERE domain = ?1 AND code IN ({})",
            placeholders(2, codes.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let args = std::iter::once(domain.as_str().to_string()).chain(codes.iter().cloned());
        let mut items = stmt
            .query_map(params_from_iter(args), |row| {
                let mut item = Item::new(domain, row.get::<_, String>(1)?);
                item.id = Some(row.get(0)?);
                item.label = row.get(2)?;
                item.type_code = row.get(3)?;
                item.status = row.get(4)?;
                item.parent_id = row.get(5)?;
                Ok(item)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if items.is_empty() {
            return Ok(items);
        }

        let index: HashMap<i64, usize> = items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| item.id.map(|id| (id, idx)))
            .collect();
        let ids: Vec<i64> = index.keys().copied().collect();

        for (parent_id, list) in Self::load_lists(&conn, &ids)? {
            if let Some(&idx) = index.get(&parent_id) {
                items[idx].lists.push(list);
            }
        }
        for (parent_id, property) in Self::load_properties(&conn, &ids)? {
            if let Some(&idx) = index.get(&parent_id) {
                items[idx].properties.push(property);
            }
        }

        Ok(items)
    }

    fn save_item(&self, item: &mut Item) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        // === 步骤 1: 父实体 ===
        let item_id = match item.id {
            Some(id) => {
                tx.execute(
                    "UPDATE item SET label = ?2, type = ?3, status = ?4, parentid = ?5, mtime = ?6 WHERE id = ?1",
                    params![id, item.label, item.type_code, item.status, item.parent_id, now],
                )?;
                id
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO item (domain, code, label, type, status, parentid, mtime)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        item.domain.as_str(),
                        item.code,
                        item.label,
                        item.type_code,
                        item.status,
                        item.parent_id,
                        now
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        // === 步骤 2: 批量删除 ===
        let ref_ids: Vec<i64> = item.deleted_refs.iter().map(|(_, id)| *id).collect();
        let deleted = delete_by_ids(&tx, "item_list", &item.deleted_lists)?
            + delete_by_ids(&tx, "ref_item", &ref_ids)?
            + delete_by_ids(&tx, "item_property", &item.deleted_properties)?;

        // === 步骤 3: 关联与独占实体 ===
        for list in item.lists.iter_mut() {
            if list.domain.owns_ref() {
                if let Some(ref_item) = list.ref_item.as_mut() {
                    list.ref_id = Some(upsert_ref_item(&tx, ref_item, &now)?);
                }
            }

            let ref_id = list.ref_id.ok_or_else(|| {
                RepositoryError::ValidationError(format!(
                    "关联缺少被引用实体: code={}, domain={}",
                    item.code, list.domain
                ))
            })?;
            let config = serde_json::to_string(&list.config)?;

            match list.id {
                Some(id) => {
                    tx.execute(
                        r#"
                        UPDATE item_list
                        SET type = ?2, refid = ?3, pos = ?4, status = ?5,
                            datestart = ?6, dateend = ?7, config = ?8, mtime = ?9
                        WHERE id = ?1
                        "#,
                        params![
                            id,
                            list.type_code,
                            ref_id,
                            list.position,
                            list.status,
                            list.date_start,
                            list.date_end,
                            config,
                            now
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        r#"
                        INSERT INTO item_list
                            (parentid, domain, type, refid, pos, status, datestart, dateend, config, mtime)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                        "#,
                        params![
                            item_id,
                            list.domain.as_str(),
                            list.type_code,
                            ref_id,
                            list.position,
                            list.status,
                            list.date_start,
                            list.date_end,
                            config,
                            now
                        ],
                    )?;
                    list.id = Some(tx.last_insert_rowid());
                }
            }
        }

        // === 步骤 4: 属性 ===
        for property in item.properties.iter_mut() {
            match property.id {
                Some(id) => {
                    tx.execute(
                        "UPDATE item_property SET type = ?2, langid = ?3, value = ?4 WHERE id = ?1",
                        params![id, property.type_code, property.language_id, property.value],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO item_property (parentid, type, langid, value) VALUES (?1, ?2, ?3, ?4)",
                        params![item_id, property.type_code, property.language_id, property.value],
                    )?;
                    property.id = Some(tx.last_insert_rowid());
                }
            }
        }

        tx.commit()?;

        item.id = Some(item_id);
        item.clear_pending_deletes();
        debug!(code = %item.code, lists = item.lists.len(), deleted = deleted, "父实体已保存");
        Ok(())
    }
}

impl RefRepository for SqliteImportRepository {
    fn resolve_codes(
        &self,
        domain: ListDomain,
        codes: &[String],
    ) -> RepositoryResult<HashMap<String, i64>> {
        let domain = link_domain(domain)?;
        if codes.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT code, id FROM item WHERE domain = ?1 AND code IN ({})",
            placeholders(2, codes.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let args = std::iter::once(domain.to_string()).chain(codes.iter().cloned());
        let map = stmt
            .query_map(params_from_iter(args), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(map)
    }

    fn find_attribute(&self, type_code: &str, code: &str) -> RepositoryResult<Option<AttributeItem>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT id, data FROM ref_item WHERE domain = 'attribute' AND type = ?1 AND code = ?2",
                params![type_code, code],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((id, data)) => match serde_json::from_str::<RefItem>(&data)? {
                RefItem::Attribute(mut attribute) => {
                    attribute.id = Some(id);
                    Ok(Some(attribute))
                }
                other => Err(RepositoryError::ValidationError(format!(
                    "ref_item {} 不是属性: {:?}",
                    id,
                    other.domain()
                ))),
            },
            None => Ok(None),
        }
    }

    fn save_attribute(&self, attribute: &mut AttributeItem) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut ref_item = RefItem::Attribute(attribute.clone());
        let id = upsert_ref_item(&tx, &mut ref_item, &Utc::now().to_rfc3339())?;
        tx.commit()?;
        attribute.id = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TextItem;

    fn repo() -> SqliteImportRepository {
        SqliteImportRepository::new(":memory:").unwrap()
    }

    fn text_list(content: &str) -> ListItem {
        let mut list = ListItem::new(ListDomain::Text, "default");
        list.ref_item = Some(RefItem::Text(TextItem {
            id: None,
            type_code: "name".to_string(),
            language_id: Some("en".to_string()),
            content: content.to_string(),
            label: content.to_string(),
            status: 1,
        }));
        list
    }

    #[test]
    fn test_save_and_find_item_roundtrip() {
        let repo = repo();
        let mut item = Item::new(ParentDomain::Product, "P1");
        item.add_list_item(text_list("hello"));
        item.properties.push(PropertyItem {
            id: None,
            type_code: "size".to_string(),
            language_id: None,
            value: "XL".to_string(),
        });

        repo.save_item(&mut item).unwrap();
        assert!(item.id.is_some());
        assert!(item.lists[0].id.is_some());
        assert!(item.lists[0].ref_id.is_some());

        let found = repo
            .find_items(ParentDomain::Product, &["P1".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].lists.len(), 1);
        assert_eq!(found[0].properties.len(), 1);
        match found[0].lists[0].ref_item.as_ref().unwrap() {
            RefItem::Text(text) => assert_eq!(text.content, "hello"),
            other => panic!("unexpected ref item {:?}", other),
        }
    }

    #[test]
    fn test_save_item_executes_pending_deletes() {
        let repo = repo();
        let mut item = Item::new(ParentDomain::Product, "P1");
        item.add_list_item(text_list("a"));
        item.add_list_item(text_list("b"));
        repo.save_item(&mut item).unwrap();

        let removed = item.take_list_items(ListDomain::Text, None);
        let (keep, drop): (Vec<_>, Vec<_>) = removed
            .into_iter()
            .partition(|li| matches!(&li.ref_item, Some(RefItem::Text(t)) if t.content == "a"));
        item.lists.extend(keep);
        item.delete_list_items(drop, true);
        repo.save_item(&mut item).unwrap();

        let found = repo
            .find_items(ParentDomain::Product, &["P1".to_string()])
            .unwrap();
        assert_eq!(found[0].lists.len(), 1);

        let conn = repo.get_conn().unwrap();
        let refs: i64 = conn
            .query_row("SELECT COUNT(*) FROM ref_item", [], |row| row.get(0))
            .unwrap();
        assert_eq!(refs, 1);
    }

    #[test]
    fn test_type_codes_and_transaction_rollback() {
        let repo = repo();
        let request = TypeRequest {
            scope: "product/lists/type".to_string(),
            domain: "text".to_string(),
            code: "default".to_string(),
        };

        repo.begin().unwrap();
        repo.save_types("product/lists/type", &[request.clone()]).unwrap();
        repo.rollback().unwrap();
        assert!(repo
            .search_type_codes("product/lists/type", &["text".to_string()])
            .unwrap()
            .is_empty());

        repo.begin().unwrap();
        repo.save_types("product/lists/type", &[request]).unwrap();
        repo.commit().unwrap();
        assert_eq!(
            repo.search_type_codes("product/lists/type", &["text".to_string()])
                .unwrap(),
            vec![("text".to_string(), "default".to_string())]
        );
    }

    #[test]
    fn test_resolve_codes_and_attributes() {
        let repo = repo();
        let id = repo
            .save_link_target(ListDomain::Supplier, "SUP-1", "Supplier 1")
            .unwrap();
        let map = repo
            .resolve_codes(ListDomain::Supplier, &["SUP-1".to_string(), "SUP-2".to_string()])
            .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["SUP-1"], id);
        assert!(repo.resolve_codes(ListDomain::Text, &[]).is_err());

        let mut attribute = AttributeItem {
            id: None,
            type_code: "color".to_string(),
            code: "red".to_string(),
            label: "Red".to_string(),
            status: 1,
        };
        repo.save_attribute(&mut attribute).unwrap();
        let found = repo.find_attribute("color", "red").unwrap().unwrap();
        assert_eq!(found.id, attribute.id);
        assert!(repo.find_attribute("color", "blue").unwrap().is_none());
    }
}
