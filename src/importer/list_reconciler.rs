// ==========================================
// 商品导入对账引擎 - 关联列表对账器
// ==========================================
// 职责: 以切块结果为准，同步父实体某一关联域的关联集合
// 流程: 作用域过滤 → 建立自然键索引 → 类型校验 → 逐块匹配/新建 → 未命中者标记删除
// 红线: 校验失败时本次调用不改动父实体（先算后写）
// ==========================================

use crate::config::{config_keys, ImportConfigReader};
use crate::domain::{
    Chunk, Item, ListDomain, ListItem, NaturalKey, ParentDomain, TypeRequest,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_chunker::split_values;
use crate::importer::type_registry::TypeRegistry;
use crate::repository::TypeRepository;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// 默认关联类型
pub const DEFAULT_LIST_TYPE: &str = "default";

// ==========================================
// 字段读取辅助
// ==========================================

/// 字段三态读取
///
/// # 返回
/// - None: 块中缺失该键
/// - Some(None): 存在但为空白
/// - Some(Some(v)): 裁剪后的值
pub fn field(chunk: &Chunk, key: &str) -> Option<Option<String>> {
    chunk.raw(key).map(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// 解析整数状态字段
pub fn parse_status(chunk: &Chunk, key: &str) -> ImportResult<Option<i32>> {
    match chunk.get(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<i32>()
            .map(Some)
            .map_err(|_| ImportError::InvalidValue {
                field: key.to_string(),
                message: format!("无法解析为整数: {}", v),
            }),
    }
}

// ==========================================
// RefTypeSpec - 被引用实体类型字段
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct RefTypeSpec {
    pub key: &'static str,     // 块中字段键，如 "text.type"
    pub default: &'static str, // 缺省类型
    pub scope: &'static str,   // 仓储作用域，如 "text/type"
}

// ==========================================
// ListKind Trait - 每种关联域的差异点
// ==========================================
// 实现者: TextKind, MediaKind, PriceKind, AttributeKind, LinkKind
pub trait ListKind {
    /// 处理器名（配置与错误信息使用）
    fn name(&self) -> &str;

    fn domain(&self) -> ListDomain;

    /// 必填字段键（多值关联域即被拆分的字段）
    fn required_key(&self) -> &'static str;

    /// 必填字段是否按分隔符拆分为多个独立值
    fn multi_value(&self) -> bool {
        false
    }

    /// 被引用实体类型字段（纯链接类为 None）
    fn ref_type(&self) -> Option<RefTypeSpec> {
        None
    }

    /// 批量预处理（如一次性解析本批次引用的全部编码）
    fn prepare(&mut self, _values: &[String]) -> ImportResult<()> {
        Ok(())
    }

    /// 登记本次导入中新建的链接目标
    fn register_target(&mut self, _domain: ListDomain, _code: &str, _id: i64) {}

    /// 已有关联的自然键
    fn item_key(&self, item: &ListItem) -> Option<NaturalKey>;

    /// 子记录的自然键
    ///
    /// # 返回
    /// - Ok(None): 引用目标不存在（记录警告并跳过该值）
    fn chunk_key(
        &mut self,
        chunk: &Chunk,
        value: &str,
        list_type: &str,
        ref_type: &str,
    ) -> ImportResult<Option<NaturalKey>>;

    /// 新建关联及被引用实体（默认值后再以块字段填充）
    fn create(
        &mut self,
        chunk: &Chunk,
        value: &str,
        list_type: &str,
        ref_type: &str,
    ) -> ImportResult<ListItem>;

    /// 仅覆写块中出现的字段
    fn update(&mut self, item: &mut ListItem, chunk: &Chunk) -> ImportResult<()>;
}

// ==========================================
// ListSettings - 作用域过滤与已知编码
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ListSettings {
    pub list_types: Option<Vec<String>>, // 作用域过滤（None = 全部关联类型在范围内）
    pub known_list_types: HashSet<String>,
    pub known_ref_types: HashSet<String>,
}

impl ListSettings {
    /// 读取配置；未配置的已知编码在构造时从仓储查询一次
    pub fn load<C, R>(
        config: &C,
        repo: &R,
        parent: ParentDomain,
        kind: &dyn ListKind,
    ) -> ImportResult<Self>
    where
        C: ImportConfigReader + ?Sized,
        R: TypeRepository + ?Sized,
    {
        let list_types = config.get_list(&config_keys::list_types(kind.name()))?;
        let known_list_types: HashSet<String> = match &list_types {
            Some(types) => types.iter().cloned().collect(),
            None => repo
                .search_type_codes(&parent.list_type_scope(), &[kind.domain().to_string()])?
                .into_iter()
                .map(|(_, code)| code)
                .collect(),
        };

        let known_ref_types = match kind.ref_type() {
            None => HashSet::new(),
            Some(spec) => match config.get_list(&config_keys::types(kind.name()))? {
                Some(types) => types.into_iter().collect(),
                None => repo
                    .search_type_codes(spec.scope, &[parent.to_string()])?
                    .into_iter()
                    .map(|(_, code)| code)
                    .collect(),
            },
        };

        debug!(
            kind = kind.name(),
            scoped = list_types.is_some(),
            list_types = known_list_types.len(),
            ref_types = known_ref_types.len(),
            "关联设置已加载"
        );

        Ok(Self {
            list_types,
            known_list_types,
            known_ref_types,
        })
    }
}

// ==========================================
// ReconcileStats - 对账统计
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }
}

/// 单个待应用值（多值展开后）
struct Entry<'a> {
    chunk: &'a Chunk,
    value: String,
    list_type: String,
    ref_type: String,
}

// ==========================================
// ListReconciler - 关联列表对账器
// ==========================================
pub struct ListReconciler<K: ListKind> {
    parent: ParentDomain,
    kind: K,
    settings: ListSettings,
    separator: char,
}

impl<K: ListKind> ListReconciler<K> {
    pub fn new(parent: ParentDomain, kind: K, settings: ListSettings, separator: char) -> Self {
        Self {
            parent,
            kind,
            settings,
            separator,
        }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut K {
        &mut self.kind
    }

    /// 块中必填字段的全部值（多值展开）
    pub fn values_of(&self, chunk: &Chunk) -> Vec<String> {
        match chunk.get(self.kind.required_key()) {
            None => Vec::new(),
            Some(v) if self.kind.multi_value() => split_values(v, self.separator),
            Some(v) => vec![v.to_string()],
        }
    }

    /// 对账
    ///
    /// # 参数
    /// - item: 父实体（成功时原地修改）
    /// - chunks: 本关联域的切块结果（源顺序）
    /// - registry: 本次导入的类型注册表
    ///
    /// # 返回
    /// - Ok(ReconcileStats): 新建/更新/删除/跳过计数
    /// - Err(Validation): 块中显式给出的类型编码不在已知集合内（父实体未改动）
    pub fn reconcile(
        &mut self,
        item: &mut Item,
        chunks: &[Chunk],
        registry: &mut TypeRegistry,
    ) -> ImportResult<ReconcileStats> {
        let domain = self.kind.domain();
        let mut stats = ReconcileStats::default();

        // === 步骤 1: 校验 + 多值展开（不改动父实体）===
        let entries = self.expand(chunks, &mut stats)?;

        // === 步骤 2: 建立自然键索引（作用域内的已有关联）===
        let scope = self.settings.list_types.clone();
        let mut lookup: HashMap<NaturalKey, ListItem> = HashMap::new();
        let mut unkeyed: Vec<ListItem> = Vec::new();
        for existing in item.list_items(domain, scope.as_deref()).cloned() {
            match self.kind.item_key(&existing) {
                Some(key) => {
                    if let Some(dup) = lookup.insert(key, existing) {
                        unkeyed.push(dup);
                    }
                }
                None => unkeyed.push(existing),
            }
        }

        // === 步骤 3: 逐值匹配/新建 ===
        let mut kept: Vec<ListItem> = Vec::with_capacity(entries.len());
        let mut kept_index: HashMap<NaturalKey, usize> = HashMap::new();
        let mut appended: Vec<usize> = Vec::new();
        let mut pos: u32 = 0;
        let mut pending_types: Vec<TypeRequest> = Vec::new();

        for entry in entries {
            let key = match self.kind.chunk_key(
                entry.chunk,
                &entry.value,
                &entry.list_type,
                &entry.ref_type,
            )? {
                Some(key) => key,
                None => {
                    warn!(
                        kind = self.kind.name(),
                        code = %item.code,
                        value = %entry.value,
                        "引用目标不存在，跳过"
                    );
                    stats.skipped += 1;
                    continue;
                }
            };

            // 同一父实体内重复自然键: 后写覆盖，位置保持首次出现
            if let Some(&idx) = kept_index.get(&key) {
                debug!(kind = self.kind.name(), key = %key, "重复自然键，合并到同一关联");
                self.kind.update(&mut kept[idx], entry.chunk)?;
                self.apply_list_fields(&mut kept[idx], entry.chunk)?;
                self.register(&mut pending_types, &entry);
                continue;
            }

            let mut list_item = match lookup.remove(&key) {
                Some(mut existing) => {
                    self.kind.update(&mut existing, entry.chunk)?;
                    stats.updated += 1;
                    existing
                }
                None => {
                    let created = self.kind.create(
                        entry.chunk,
                        &entry.value,
                        &entry.list_type,
                        &entry.ref_type,
                    )?;
                    stats.created += 1;
                    appended.push(kept.len());
                    created
                }
            };
            self.apply_list_fields(&mut list_item, entry.chunk)?;

            if domain.is_ordered() {
                list_item.position = pos;
                pos += 1;
            }

            self.register(&mut pending_types, &entry);
            kept_index.insert(key, kept.len());
            kept.push(list_item);
        }

        // 纯身份关联: 已有关联位置不变，新关联追加到末尾
        if !domain.is_ordered() {
            let out_of_scope = item
                .list_items(domain, None)
                .filter(|li| !self.in_filter(&li.type_code))
                .map(|li| li.position + 1);
            let matched = kept
                .iter()
                .enumerate()
                .filter(|(idx, _)| !appended.contains(idx))
                .map(|(_, li)| li.position + 1);
            let mut next = out_of_scope.chain(matched).max().unwrap_or(0);
            for idx in appended {
                kept[idx].position = next;
                next += 1;
            }
        }

        // === 步骤 4: 写回父实体，未命中者标记删除 ===
        let mut orphans: Vec<ListItem> = lookup.into_values().collect();
        orphans.append(&mut unkeyed);
        stats.deleted = orphans.len();

        item.take_list_items(domain, scope.as_deref());
        item.lists.extend(kept);
        item.delete_list_items(orphans, domain.owns_ref());
        for req in pending_types {
            registry.request(&req.scope, &req.domain, &req.code);
        }

        debug!(
            kind = self.kind.name(),
            code = %item.code,
            created = stats.created,
            updated = stats.updated,
            deleted = stats.deleted,
            skipped = stats.skipped,
            "关联对账完成"
        );
        Ok(stats)
    }

    /// 校验并展开为待应用值
    fn expand<'a>(
        &self,
        chunks: &'a [Chunk],
        stats: &mut ReconcileStats,
    ) -> ImportResult<Vec<Entry<'a>>> {
        let list_type_key = self.parent.list_key("type");
        let mut entries = Vec::new();

        for chunk in chunks {
            let values = self.values_of(chunk);
            if values.is_empty() {
                stats.skipped += 1;
                continue;
            }

            // 关联类型
            let list_type = match chunk.get(&list_type_key) {
                Some(code) if code != DEFAULT_LIST_TYPE => {
                    if !self.in_filter(code) || !self.settings.known_list_types.contains(code) {
                        return Err(self.invalid(self.parent.list_type_scope(), code));
                    }
                    code.to_string()
                }
                _ => {
                    if !self.in_filter(DEFAULT_LIST_TYPE) {
                        debug!(kind = self.kind.name(), "默认关联类型不在作用域内，跳过");
                        stats.skipped += 1;
                        continue;
                    }
                    DEFAULT_LIST_TYPE.to_string()
                }
            };

            // 被引用实体类型
            let ref_type = match self.kind.ref_type() {
                None => String::new(),
                Some(spec) => match chunk.get(spec.key) {
                    Some(code)
                        if code != spec.default && !self.settings.known_ref_types.contains(code) =>
                    {
                        return Err(self.invalid(spec.scope.to_string(), code));
                    }
                    Some(code) => code.to_string(),
                    None => spec.default.to_string(),
                },
            };

            for value in values {
                entries.push(Entry {
                    chunk,
                    value,
                    list_type: list_type.clone(),
                    ref_type: ref_type.clone(),
                });
            }
        }

        Ok(entries)
    }

    /// 关联类型是否在作用域过滤内
    fn in_filter(&self, list_type: &str) -> bool {
        self.settings
            .list_types
            .as_ref()
            .map_or(true, |types| types.iter().any(|t| t == list_type))
    }

    fn invalid(&self, domain: String, code: &str) -> ImportError {
        ImportError::Validation {
            kind: self.kind.name().to_string(),
            domain,
            code: code.to_string(),
        }
    }

    /// 关联自身字段（状态、有效期、配置）
    fn apply_list_fields(&self, list_item: &mut ListItem, chunk: &Chunk) -> ImportResult<()> {
        if let Some(status) = parse_status(chunk, &self.parent.list_key("status"))? {
            list_item.status = status;
        }
        if let Some(start) = field(chunk, &self.parent.list_key("datestart")) {
            list_item.date_start = start;
        }
        if let Some(end) = field(chunk, &self.parent.list_key("dateend")) {
            list_item.date_end = end;
        }
        let config_key = self.parent.list_key("config");
        if let Some(raw) = chunk.get(&config_key) {
            list_item.config =
                serde_json::from_str(raw).map_err(|e| ImportError::InvalidValue {
                    field: config_key.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn register(&self, pending: &mut Vec<TypeRequest>, entry: &Entry<'_>) {
        pending.push(TypeRequest {
            scope: self.parent.list_type_scope(),
            domain: self.kind.domain().to_string(),
            code: entry.list_type.clone(),
        });
        if let Some(spec) = self.kind.ref_type() {
            pending.push(TypeRequest {
                scope: spec.scope.to_string(),
                domain: self.parent.to_string(),
                code: entry.ref_type.clone(),
            });
        }
    }
}
