// ==========================================
// 商品导入对账引擎 - 导入 Repository Trait
// ==========================================
// 职责: 定义对账引擎所需的数据访问接口（不包含实现）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::{AttributeItem, Item, ListDomain, ParentDomain, TypeRequest};
use crate::repository::error::RepositoryResult;
use std::collections::HashMap;

// ==========================================
// TypeRepository Trait
// ==========================================
// 用途: 分类编码（类型）读写，按作用域批量
// 实现者: SqliteImportRepository
pub trait TypeRepository: Send + Sync {
    /// 批量查询作用域下已存在的类型编码
    ///
    /// # 参数
    /// - scope: 仓储作用域（如 "product/lists/type"）
    /// - domains: 领域列表
    ///
    /// # 返回
    /// - Ok(Vec<(domain, code)>): 已存在的编码
    fn search_type_codes(
        &self,
        scope: &str,
        domains: &[String],
    ) -> RepositoryResult<Vec<(String, String)>>;

    /// 批量写入类型编码（单次写入）
    fn save_types(&self, scope: &str, types: &[TypeRequest]) -> RepositoryResult<usize>;

    fn begin(&self) -> RepositoryResult<()>;
    fn commit(&self) -> RepositoryResult<()>;
    fn rollback(&self) -> RepositoryResult<()>;
}

// ==========================================
// ItemRepository Trait
// ==========================================
// 用途: 父实体（含关联、被引用实体、属性）读写
pub trait ItemRepository: Send + Sync {
    /// 按编码批量加载父实体（含全部关联与属性）
    fn find_items(&self, domain: ParentDomain, codes: &[String]) -> RepositoryResult<Vec<Item>>;

    /// 保存父实体
    ///
    /// # 说明
    /// - 先执行待删除缓冲中的批量删除，再写入关联与独占实体
    /// - 整体在一个事务内完成，成功后清空待删除缓冲
    fn save_item(&self, item: &mut Item) -> RepositoryResult<()>;
}

// ==========================================
// RefRepository Trait
// ==========================================
// 用途: 共享被引用实体（属性）与链接目标（目录/商品/供应商）查询
pub trait RefRepository: Send + Sync {
    /// 批量解析链接目标编码 → ID
    fn resolve_codes(
        &self,
        domain: ListDomain,
        codes: &[String],
    ) -> RepositoryResult<HashMap<String, i64>>;

    /// 按 (type, code) 查询共享属性
    fn find_attribute(&self, type_code: &str, code: &str) -> RepositoryResult<Option<AttributeItem>>;

    /// 保存共享属性（新建时回填 ID）
    fn save_attribute(&self, attribute: &mut AttributeItem) -> RepositoryResult<()>;
}

/// 对账引擎依赖的全部仓储能力
pub trait ImportRepository: TypeRepository + ItemRepository + RefRepository {}

impl<T: TypeRepository + ItemRepository + RefRepository> ImportRepository for T {}
