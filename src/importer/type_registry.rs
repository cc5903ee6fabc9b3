// ==========================================
// 商品导入对账引擎 - 类型注册表
// ==========================================
// 职责: 累积本次导入中出现的 (作用域, 领域, 编码)，
//       导入结束时按作用域批量补建缺失编码
// 红线: 单次导入独占，flush 恰好一次，flush 永不返回错误
// ==========================================

use crate::domain::TypeRequest;
use crate::repository::{RepositoryResult, TypeRepository};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, error, info, warn};

// ==========================================
// FlushReport - 补建结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub created: usize,             // 新建编码数
    pub failed_scopes: Vec<String>, // 补建失败（已回滚）的作用域
}

// ==========================================
// TypeRegistry - 延迟类型注册表
// ==========================================
#[derive(Debug, Default)]
pub struct TypeRegistry {
    // scope → domain → codes
    requests: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录类型需求（幂等，无 I/O）
    pub fn request(&mut self, scope: &str, domain: &str, code: &str) {
        self.requests
            .entry(scope.to_string())
            .or_default()
            .entry(domain.to_string())
            .or_default()
            .insert(code.to_string());
    }

    /// 当前累积的全部需求（按作用域/领域/编码排序）
    pub fn requested(&self) -> Vec<TypeRequest> {
        self.requests
            .iter()
            .flat_map(|(scope, domains)| {
                domains.iter().flat_map(move |(domain, codes)| {
                    codes.iter().map(move |code| TypeRequest {
                        scope: scope.clone(),
                        domain: domain.clone(),
                        code: code.clone(),
                    })
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// 合并另一注册表的需求（单行成功后并入本次导入）
    pub fn merge(&mut self, other: TypeRegistry) {
        for (scope, domains) in other.requests {
            let target = self.requests.entry(scope).or_default();
            for (domain, codes) in domains {
                target.entry(domain).or_default().extend(codes);
            }
        }
    }

    /// 补建缺失编码并清空需求
    ///
    /// # 流程（每个作用域）
    /// 1. 一次批量读取该作用域下所有领域的已有编码
    /// 2. 需求 − 已有 = 缺失
    /// 3. 作用域内事务中一次批量写入
    ///
    /// # 失败策略
    /// - 单个作用域失败：回滚、记录日志、继续下一个作用域
    pub fn flush<R>(&mut self, repo: &R) -> FlushReport
    where
        R: TypeRepository + ?Sized,
    {
        let requests = std::mem::take(&mut self.requests);
        let mut report = FlushReport::default();

        for (scope, domains) in requests {
            match Self::flush_scope(repo, &scope, &domains) {
                Ok(created) => report.created += created,
                Err(e) => {
                    error!(scope = %scope, error = %e, "类型编码补建失败，已回滚");
                    report.failed_scopes.push(scope);
                }
            }
        }

        info!(
            created = report.created,
            failed = report.failed_scopes.len(),
            "类型注册表已刷新"
        );
        report
    }

    fn flush_scope<R>(
        repo: &R,
        scope: &str,
        domains: &BTreeMap<String, BTreeSet<String>>,
    ) -> RepositoryResult<usize>
    where
        R: TypeRepository + ?Sized,
    {
        let domain_list: Vec<String> = domains.keys().cloned().collect();
        let existing: HashSet<(String, String)> = repo
            .search_type_codes(scope, &domain_list)?
            .into_iter()
            .collect();

        let missing: Vec<TypeRequest> = domains
            .iter()
            .flat_map(|(domain, codes)| {
                codes.iter().map(move |code| (domain.clone(), code.clone()))
            })
            .filter(|key| !existing.contains(key))
            .map(|(domain, code)| TypeRequest {
                scope: scope.to_string(),
                domain,
                code,
            })
            .collect();

        if missing.is_empty() {
            debug!(scope = %scope, "无缺失类型编码");
            return Ok(0);
        }

        repo.begin()?;
        let result = repo
            .save_types(scope, &missing)
            .and_then(|count| repo.commit().map(|_| count));

        if result.is_err() {
            if let Err(e) = repo.rollback() {
                warn!(scope = %scope, error = %e, "事务回滚失败");
            }
        }
        result
    }
}
