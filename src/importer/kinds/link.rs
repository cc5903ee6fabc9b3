// ==========================================
// 链接关联（目录 / 商品 / 供应商）
// ==========================================
// 自然键: listtype + 目标编码（按解析后的目标 ID 比较）
// 纯身份关联: 无被引用实体，目标编码无法解析时跳过该值
// ==========================================

use crate::domain::{Chunk, ListDomain, ListItem, NaturalKey};
use crate::importer::code_cache::CodeCache;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::list_reconciler::ListKind;
use crate::repository::RefRepository;
use std::sync::Arc;

pub struct LinkKind {
    domain: ListDomain,
    cache: CodeCache,
}

impl LinkKind {
    /// 创建链接关联
    ///
    /// # 参数
    /// - domain: 目标域（仅 catalog / product / supplier）
    pub fn new(domain: ListDomain, repo: Arc<dyn RefRepository>) -> ImportResult<Self> {
        match domain {
            ListDomain::Catalog | ListDomain::Product | ListDomain::Supplier => Ok(Self {
                domain,
                cache: CodeCache::new(domain, repo),
            }),
            other => Err(ImportError::Configuration(format!(
                "关联域 {} 不是链接目标",
                other
            ))),
        }
    }
}

impl ListKind for LinkKind {
    fn name(&self) -> &str {
        self.domain.as_str()
    }

    fn domain(&self) -> ListDomain {
        self.domain
    }

    fn required_key(&self) -> &'static str {
        match self.domain {
            ListDomain::Catalog => "catalog.code",
            ListDomain::Product => "product.code",
            _ => "supplier.code",
        }
    }

    fn multi_value(&self) -> bool {
        true
    }

    fn prepare(&mut self, values: &[String]) -> ImportResult<()> {
        self.cache.prepare(values)
    }

    fn register_target(&mut self, domain: ListDomain, code: &str, id: i64) {
        if domain == self.domain {
            self.cache.set(code, id);
        }
    }

    fn item_key(&self, item: &ListItem) -> Option<NaturalKey> {
        let ref_id = item.ref_id?;
        Some(NaturalKey::new([item.type_code.clone(), ref_id.to_string()]))
    }

    fn chunk_key(
        &mut self,
        _chunk: &Chunk,
        value: &str,
        list_type: &str,
        _ref_type: &str,
    ) -> ImportResult<Option<NaturalKey>> {
        Ok(self
            .cache
            .get(value)?
            .map(|id| NaturalKey::new([list_type.to_string(), id.to_string()])))
    }

    fn create(
        &mut self,
        _chunk: &Chunk,
        value: &str,
        list_type: &str,
        _ref_type: &str,
    ) -> ImportResult<ListItem> {
        let id = self.cache.get(value)?.ok_or_else(|| {
            ImportError::InternalError(format!("链接目标未解析: {} {}", self.domain, value))
        })?;

        let mut list = ListItem::new(self.domain, list_type);
        list.ref_id = Some(id);
        Ok(list)
    }

    fn update(&mut self, _item: &mut ListItem, _chunk: &Chunk) -> ImportResult<()> {
        Ok(())
    }
}
