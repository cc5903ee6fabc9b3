// ==========================================
// 父实体属性（非关联）
// ==========================================
// 自然键: type + language + value
// 与关联对账同构: 校验 → 匹配/新建 → 未命中者标记删除
// ==========================================

use crate::config::{config_keys, ImportConfigReader};
use crate::domain::{Chunk, Item, NaturalKey, ParentDomain, PropertyItem};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::list_reconciler::ReconcileStats;
use crate::importer::type_registry::TypeRegistry;
use crate::repository::TypeRepository;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 默认属性类型
pub const DEFAULT_PROPERTY_TYPE: &str = "default";

#[derive(Debug, Clone, Default)]
pub struct PropertySettings {
    pub known_types: HashSet<String>,
}

impl PropertySettings {
    /// 已知属性类型: 配置优先，否则从仓储查询一次
    pub fn load<C, R>(config: &C, repo: &R, parent: ParentDomain) -> ImportResult<Self>
    where
        C: ImportConfigReader + ?Sized,
        R: TypeRepository + ?Sized,
    {
        let known_types = match config.get_list(&config_keys::types("property"))? {
            Some(types) => types.into_iter().collect(),
            None => repo
                .search_type_codes(&parent.property_type_scope(), &[parent.to_string()])?
                .into_iter()
                .map(|(_, code)| code)
                .collect(),
        };
        Ok(Self { known_types })
    }
}

fn property_key(property: &PropertyItem) -> NaturalKey {
    NaturalKey::new([
        property.type_code.as_str(),
        property.language_id.as_deref().unwrap_or(""),
        property.value.as_str(),
    ])
}

pub struct PropertyReconciler {
    parent: ParentDomain,
    settings: PropertySettings,
    type_key: String,
    language_key: String,
    value_key: String,
}

impl PropertyReconciler {
    pub fn new(parent: ParentDomain, settings: PropertySettings) -> Self {
        Self {
            parent,
            settings,
            type_key: parent.item_key("property.type"),
            language_key: parent.item_key("property.languageid"),
            value_key: parent.item_key("property.value"),
        }
    }

    /// 对账父实体属性
    ///
    /// 显式类型不在已知集合内时返回 Validation 错误，父实体保持不变
    pub fn reconcile(
        &self,
        item: &mut Item,
        chunks: &[Chunk],
        registry: &mut TypeRegistry,
    ) -> ImportResult<ReconcileStats> {
        let mut stats = ReconcileStats::default();

        // 校验（先于任何修改）
        for chunk in chunks {
            if let Some(code) = chunk.get(&self.type_key) {
                if code != DEFAULT_PROPERTY_TYPE
                    && chunk.get(&self.value_key).is_some()
                    && !self.settings.known_types.contains(code)
                {
                    return Err(ImportError::Validation {
                        kind: "property".to_string(),
                        domain: self.parent.property_type_scope(),
                        code: code.to_string(),
                    });
                }
            }
        }

        let mut lookup: HashMap<NaturalKey, PropertyItem> = HashMap::new();
        let mut duplicates: Vec<PropertyItem> = Vec::new();
        for existing in item.properties.iter().cloned() {
            if let Some(dup) = lookup.insert(property_key(&existing), existing) {
                duplicates.push(dup);
            }
        }

        let mut kept: Vec<PropertyItem> = Vec::with_capacity(chunks.len());
        let mut seen: HashSet<NaturalKey> = HashSet::new();
        let mut types: Vec<String> = Vec::new();

        for chunk in chunks {
            let Some(value) = chunk.get(&self.value_key) else {
                stats.skipped += 1;
                continue;
            };
            let candidate = PropertyItem {
                id: None,
                type_code: chunk.get_or(&self.type_key, DEFAULT_PROPERTY_TYPE).to_string(),
                language_id: chunk.get(&self.language_key).map(str::to_string),
                value: value.to_string(),
            };
            let key = property_key(&candidate);
            if !seen.insert(key.clone()) {
                continue;
            }

            types.push(candidate.type_code.clone());
            match lookup.remove(&key) {
                Some(existing) => {
                    stats.updated += 1;
                    kept.push(existing);
                }
                None => {
                    stats.created += 1;
                    kept.push(candidate);
                }
            }
        }

        let mut orphans: Vec<PropertyItem> = lookup.into_values().collect();
        orphans.append(&mut duplicates);
        stats.deleted = orphans.len();

        item.take_properties();
        item.properties = kept;
        item.delete_properties(orphans);

        let scope = self.parent.property_type_scope();
        for code in types {
            registry.request(&scope, self.parent.as_str(), &code);
        }

        debug!(
            code = %item.code,
            created = stats.created,
            deleted = stats.deleted,
            "属性对账完成"
        );
        Ok(stats)
    }
}
