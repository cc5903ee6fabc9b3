// ==========================================
// 商品导入对账引擎 - 编码缓存
// ==========================================
// 职责: 链接目标编码 → ID 的批量解析与缓存
// 用途: 一个批次内引用的全部编码一次查询完成
// ==========================================

use crate::domain::ListDomain;
use crate::importer::error::ImportResult;
use crate::repository::RefRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct CodeCache {
    domain: ListDomain,
    repo: Arc<dyn RefRepository>,
    // 未命中也缓存为 None，避免同一批次重复查询
    ids: HashMap<String, Option<i64>>,
    lookups: usize,
}

impl CodeCache {
    pub fn new(domain: ListDomain, repo: Arc<dyn RefRepository>) -> Self {
        Self {
            domain,
            repo,
            ids: HashMap::new(),
            lookups: 0,
        }
    }

    /// 批量解析尚未缓存的编码（单次仓储调用）
    pub fn prepare(&mut self, codes: &[String]) -> ImportResult<()> {
        let mut missing: Vec<String> = codes
            .iter()
            .filter(|c| !self.ids.contains_key(c.as_str()))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();

        if missing.is_empty() {
            return Ok(());
        }

        let found = self.repo.resolve_codes(self.domain, &missing)?;
        self.lookups += 1;
        debug!(
            domain = %self.domain,
            requested = missing.len(),
            found = found.len(),
            "编码批量解析"
        );

        for code in missing {
            let id = found.get(&code).copied();
            self.ids.insert(code, id);
        }
        Ok(())
    }

    /// 查询编码 ID，未缓存时单独解析一次
    pub fn get(&mut self, code: &str) -> ImportResult<Option<i64>> {
        if let Some(id) = self.ids.get(code) {
            return Ok(*id);
        }
        self.prepare(&[code.to_string()])?;
        Ok(self.ids.get(code).copied().flatten())
    }

    /// 登记本次导入中新建的目标（如同批次先出现的目录节点）
    pub fn set(&mut self, code: impl Into<String>, id: i64) {
        self.ids.insert(code.into(), Some(id));
    }

    /// 仓储查询次数
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttributeItem;
    use crate::repository::RepositoryResult;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockRefRepo {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl RefRepository for MockRefRepo {
        fn resolve_codes(
            &self,
            _domain: ListDomain,
            codes: &[String],
        ) -> RepositoryResult<HashMap<String, i64>> {
            self.calls.lock().unwrap().push(codes.to_vec());
            Ok(codes
                .iter()
                .filter(|c| c.starts_with("C"))
                .enumerate()
                .map(|(i, c)| (c.clone(), i as i64 + 100))
                .collect())
        }

        fn find_attribute(&self, _: &str, _: &str) -> RepositoryResult<Option<AttributeItem>> {
            Ok(None)
        }

        fn save_attribute(&self, _: &mut AttributeItem) -> RepositoryResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_prepare_resolves_batch_once() {
        let repo = Arc::new(MockRefRepo::default());
        let mut cache = CodeCache::new(ListDomain::Catalog, repo.clone());

        let codes: Vec<String> = ["C1", "C2", "X9", "C1"].iter().map(|s| s.to_string()).collect();
        cache.prepare(&codes).unwrap();

        assert!(cache.get("C1").unwrap().is_some());
        assert!(cache.get("C2").unwrap().is_some());
        assert_eq!(cache.get("X9").unwrap(), None, "未命中应缓存为 None");
        assert_eq!(cache.lookups(), 1);
        assert_eq!(repo.calls.lock().unwrap()[0].len(), 3, "重复编码应去重");
    }

    #[test]
    fn test_get_uncached_falls_back_to_single_lookup() {
        let repo = Arc::new(MockRefRepo::default());
        let mut cache = CodeCache::new(ListDomain::Supplier, repo);

        assert!(cache.get("C7").unwrap().is_some());
        assert!(cache.get("C7").unwrap().is_some());
        assert_eq!(cache.lookups(), 1);

        cache.set("NEW", 5);
        assert_eq!(cache.get("NEW").unwrap(), Some(5));
        assert_eq!(cache.lookups(), 1);
    }
}
