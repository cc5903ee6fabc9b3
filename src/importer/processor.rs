// ==========================================
// 商品导入对账引擎 - 处理链
// ==========================================
// 职责: 按配置顺序串联各关联域处理器，逐行对账父实体
// 结构: 装饰器链（每个处理器持有下一个），末端为 Done（原样返回剩余行）
// 红线: 处理器名在装配阶段全部校验；类型注册表由处理链独占，finish 时恰好刷新一次
// ==========================================

use crate::config::{config_keys, ImportConfigReader};
use crate::domain::{FieldMapping, Item, ListDomain, ParentDomain, RawRow};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_chunker::{chunk, parse_separator, peek_chunks, DEFAULT_SEPARATOR};
use crate::importer::kinds::{
    AttributeKind, LinkKind, MediaKind, PriceKind, PropertyReconciler, PropertySettings, TextKind,
};
use crate::importer::list_reconciler::{ListKind, ListReconciler, ListSettings, ReconcileStats};
use crate::importer::type_registry::{FlushReport, TypeRegistry};
use crate::repository::{RefRepository, TypeRepository};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

// ==========================================
// Processor Trait
// ==========================================
pub trait Processor {
    fn name(&self) -> &str;

    /// 批次预处理（先于该批次任何一行），需向下游传递
    fn prepare(&mut self, rows: &[RawRow]) -> ImportResult<()>;

    /// 处理一行：对账本处理器负责的关联域，再交给下一个处理器
    ///
    /// # 返回
    /// - 未被任何处理器消费的列
    fn process(
        &mut self,
        item: &mut Item,
        row: RawRow,
        registry: &mut TypeRegistry,
    ) -> ImportResult<RawRow>;

    /// 登记同一次导入中新保存的父实体（链接目标）
    fn register_target(&mut self, domain: ListDomain, code: &str, id: i64);

    /// 按链顺序收集对账统计
    fn collect_stats(&self, out: &mut Vec<(String, ReconcileStats)>);
}

// ==========================================
// Done - 链末端
// ==========================================
#[derive(Debug, Default)]
pub struct Done;

impl Processor for Done {
    fn name(&self) -> &str {
        "done"
    }

    fn prepare(&mut self, _rows: &[RawRow]) -> ImportResult<()> {
        Ok(())
    }

    fn process(
        &mut self,
        _item: &mut Item,
        row: RawRow,
        _registry: &mut TypeRegistry,
    ) -> ImportResult<RawRow> {
        Ok(row)
    }

    fn register_target(&mut self, _domain: ListDomain, _code: &str, _id: i64) {}

    fn collect_stats(&self, _out: &mut Vec<(String, ReconcileStats)>) {}
}

// ==========================================
// ListProcessor - 关联域处理器
// ==========================================
pub struct ListProcessor<K: ListKind> {
    reconciler: ListReconciler<K>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
    stats: ReconcileStats,
}

impl<K: ListKind> ListProcessor<K> {
    pub fn new(reconciler: ListReconciler<K>, mapping: FieldMapping, next: Box<dyn Processor>) -> Self {
        Self {
            reconciler,
            mapping,
            next,
            stats: ReconcileStats::default(),
        }
    }
}

impl<K: ListKind> Processor for ListProcessor<K> {
    fn name(&self) -> &str {
        self.reconciler.kind().name()
    }

    fn prepare(&mut self, rows: &[RawRow]) -> ImportResult<()> {
        let values: Vec<String> = rows
            .iter()
            .flat_map(|row| peek_chunks(row, &self.mapping))
            .flat_map(|c| self.reconciler.values_of(&c))
            .collect();
        if !values.is_empty() {
            self.reconciler.kind_mut().prepare(&values)?;
        }
        self.next.prepare(rows)
    }

    fn process(
        &mut self,
        item: &mut Item,
        mut row: RawRow,
        registry: &mut TypeRegistry,
    ) -> ImportResult<RawRow> {
        let chunks = chunk(&mut row, &self.mapping);
        let stats = self.reconciler.reconcile(item, &chunks, registry)?;
        self.stats += stats;
        self.next.process(item, row, registry)
    }

    fn register_target(&mut self, domain: ListDomain, code: &str, id: i64) {
        self.reconciler.kind_mut().register_target(domain, code, id);
        self.next.register_target(domain, code, id);
    }

    fn collect_stats(&self, out: &mut Vec<(String, ReconcileStats)>) {
        out.push((self.name().to_string(), self.stats));
        self.next.collect_stats(out);
    }
}

// ==========================================
// PropertyProcessor - 父实体属性处理器
// ==========================================
pub struct PropertyProcessor {
    reconciler: PropertyReconciler,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
    stats: ReconcileStats,
}

impl Processor for PropertyProcessor {
    fn name(&self) -> &str {
        "property"
    }

    fn prepare(&mut self, rows: &[RawRow]) -> ImportResult<()> {
        self.next.prepare(rows)
    }

    fn process(
        &mut self,
        item: &mut Item,
        mut row: RawRow,
        registry: &mut TypeRegistry,
    ) -> ImportResult<RawRow> {
        let chunks = chunk(&mut row, &self.mapping);
        self.stats += self.reconciler.reconcile(item, &chunks, registry)?;
        self.next.process(item, row, registry)
    }

    fn register_target(&mut self, domain: ListDomain, code: &str, id: i64) {
        self.next.register_target(domain, code, id);
    }

    fn collect_stats(&self, out: &mut Vec<(String, ReconcileStats)>) {
        out.push((self.name().to_string(), self.stats));
        self.next.collect_stats(out);
    }
}

// ==========================================
// ProcessorContext - 装配上下文
// ==========================================
pub struct ProcessorContext<'a> {
    pub parent: ParentDomain,
    pub config: &'a dyn ImportConfigReader,
    pub types: Arc<dyn TypeRepository>,
    pub refs: Arc<dyn RefRepository>,
    pub separator: char,
    pub media_root: Option<PathBuf>,
}

impl<'a> ProcessorContext<'a> {
    /// 读取分隔符与媒体根目录配置
    pub fn new<R>(
        parent: ParentDomain,
        config: &'a dyn ImportConfigReader,
        repo: Arc<R>,
    ) -> ImportResult<Self>
    where
        R: TypeRepository + RefRepository + 'static,
    {
        let separator = match config.get(config_keys::SEPARATOR)? {
            Some(raw) => parse_separator(&raw)?,
            None => DEFAULT_SEPARATOR,
        };
        let media_root = config.get(config_keys::MEDIA_ROOT)?.map(PathBuf::from);

        Ok(Self {
            parent,
            config,
            types: repo.clone(),
            refs: repo,
            separator,
            media_root,
        })
    }
}

// ==========================================
// 处理器注册表（静态）
// ==========================================
pub type ProcessorFactory = fn(
    &ProcessorContext<'_>,
    FieldMapping,
    Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>>;

/// 全部可用处理器名
pub const PROCESSOR_NAMES: [&str; 8] = [
    "text",
    "media",
    "price",
    "attribute",
    "catalog",
    "product",
    "supplier",
    "property",
];

/// 按名称查找处理器构造函数
pub fn factory(name: &str) -> Option<ProcessorFactory> {
    let factory: ProcessorFactory = match name {
        "text" => build_text,
        "media" => build_media,
        "price" => build_price,
        "attribute" => build_attribute,
        "catalog" => build_catalog,
        "product" => build_product,
        "supplier" => build_supplier,
        "property" => build_property,
        _ => return None,
    };
    Some(factory)
}

fn list_processor<K: ListKind + 'static>(
    ctx: &ProcessorContext<'_>,
    kind: K,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    let settings = ListSettings::load(ctx.config, ctx.types.as_ref(), ctx.parent, &kind)?;
    let reconciler = ListReconciler::new(ctx.parent, kind, settings, ctx.separator);
    Ok(Box::new(ListProcessor::new(reconciler, mapping, next)))
}

fn build_text(
    ctx: &ProcessorContext<'_>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    list_processor(ctx, TextKind::new(), mapping, next)
}

fn build_media(
    ctx: &ProcessorContext<'_>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    list_processor(ctx, MediaKind::new(ctx.media_root.clone()), mapping, next)
}

fn build_price(
    ctx: &ProcessorContext<'_>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    list_processor(ctx, PriceKind::new(), mapping, next)
}

fn build_attribute(
    ctx: &ProcessorContext<'_>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    list_processor(ctx, AttributeKind::new(ctx.refs.clone()), mapping, next)
}

fn build_catalog(
    ctx: &ProcessorContext<'_>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    let kind = LinkKind::new(ListDomain::Catalog, ctx.refs.clone())?;
    list_processor(ctx, kind, mapping, next)
}

fn build_product(
    ctx: &ProcessorContext<'_>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    let kind = LinkKind::new(ListDomain::Product, ctx.refs.clone())?;
    list_processor(ctx, kind, mapping, next)
}

fn build_supplier(
    ctx: &ProcessorContext<'_>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    let kind = LinkKind::new(ListDomain::Supplier, ctx.refs.clone())?;
    list_processor(ctx, kind, mapping, next)
}

fn build_property(
    ctx: &ProcessorContext<'_>,
    mapping: FieldMapping,
    next: Box<dyn Processor>,
) -> ImportResult<Box<dyn Processor>> {
    let settings = PropertySettings::load(ctx.config, ctx.types.as_ref(), ctx.parent)?;
    Ok(Box::new(PropertyProcessor {
        reconciler: PropertyReconciler::new(ctx.parent, settings),
        mapping,
        next,
        stats: ReconcileStats::default(),
    }))
}

// ==========================================
// ProcessorChain - 处理链
// ==========================================
pub struct ProcessorChain {
    head: Box<dyn Processor>,
    names: Vec<String>,
    registry: TypeRegistry,
}

impl ProcessorChain {
    /// 按配置 import/processors 装配（未配置时仅含末端）
    pub fn from_config(ctx: &ProcessorContext<'_>) -> ImportResult<Self> {
        let names = ctx.config.get_list(config_keys::PROCESSORS)?.unwrap_or_default();
        Self::build(ctx, &names)
    }

    /// 装配处理链
    ///
    /// # 参数
    /// - names: 处理器名，按执行顺序
    ///
    /// # 返回
    /// - Err(Configuration): 未知处理器名、重复名或缺少字段映射（不构造任何处理器）
    pub fn build(ctx: &ProcessorContext<'_>, names: &[String]) -> ImportResult<Self> {
        // === 步骤 1: 校验全部名称与映射 ===
        let mut seen = HashSet::new();
        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            let factory = factory(name).ok_or_else(|| {
                ImportError::Configuration(format!(
                    "未知处理器: {}（可用: {}）",
                    name,
                    PROCESSOR_NAMES.join(", ")
                ))
            })?;
            if !seen.insert(name.as_str()) {
                return Err(ImportError::Configuration(format!("处理器重复: {}", name)));
            }
            let key = config_keys::mapping(name);
            let mapping = ctx.config.get_mapping(&key)?.ok_or_else(|| {
                ImportError::Configuration(format!("处理器 {} 缺少字段映射 {}", name, key))
            })?;
            parts.push((factory, mapping));
        }

        // === 步骤 2: 由内向外构造 ===
        let mut head: Box<dyn Processor> = Box::new(Done);
        for (factory, mapping) in parts.into_iter().rev() {
            head = factory(ctx, mapping, head)?;
        }

        info!(parent = %ctx.parent, processors = ?names, "处理链已装配");
        Ok(Self {
            head,
            names: names.to_vec(),
            registry: TypeRegistry::new(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn prepare(&mut self, rows: &[RawRow]) -> ImportResult<()> {
        self.head.prepare(rows)
    }

    /// 处理一行
    ///
    /// 类型需求先记入行内临时注册表，整行成功后才并入本次导入
    pub fn process(&mut self, item: &mut Item, row: RawRow) -> ImportResult<RawRow> {
        let mut scratch = TypeRegistry::new();
        let rest = self.head.process(item, row, &mut scratch)?;
        self.registry.merge(scratch);
        Ok(rest)
    }

    pub fn register_target(&mut self, domain: ListDomain, code: &str, id: i64) {
        self.head.register_target(domain, code, id);
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// 各处理器对账统计（链顺序）
    pub fn stats(&self) -> Vec<(String, ReconcileStats)> {
        let mut out = Vec::with_capacity(self.names.len());
        self.head.collect_stats(&mut out);
        out
    }

    /// 结束导入并刷新类型注册表（消费处理链）
    pub fn finish<R>(mut self, repo: &R) -> FlushReport
    where
        R: TypeRepository + ?Sized,
    {
        debug!(requests = self.registry.requested().len(), "刷新类型注册表");
        self.registry.flush(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::repository::SqliteImportRepository;

    fn config() -> MapConfig {
        MapConfig::new()
            .with("import/mapping/text", r#"{"1": "text.type", "2": "text.content"}"#)
            .with("import/mapping/price", r#"{"3": "price.value"}"#)
            .with("import/processor/text/types", "name")
            .with("import/processor/text/listtypes", "default")
    }

    fn row(values: &[(usize, &str)]) -> RawRow {
        values.iter().map(|(p, v)| (*p, v.to_string())).collect()
    }

    #[test]
    fn test_unknown_processor_is_configuration_error() {
        let config = config();
        let repo = Arc::new(SqliteImportRepository::new(":memory:").unwrap());
        let ctx = ProcessorContext::new(ParentDomain::Product, &config, repo).unwrap();

        let names = vec!["text".to_string(), "video".to_string()];
        let err = ProcessorChain::build(&ctx, &names).err().unwrap();
        assert!(matches!(err, ImportError::Configuration(_)));
    }

    #[test]
    fn test_missing_mapping_is_configuration_error() {
        let config = config();
        let repo = Arc::new(SqliteImportRepository::new(":memory:").unwrap());
        let ctx = ProcessorContext::new(ParentDomain::Product, &config, repo).unwrap();

        let err = ProcessorChain::build(&ctx, &["media".to_string()]).err().unwrap();
        assert!(matches!(err, ImportError::Configuration(_)));
    }

    #[test]
    fn test_chain_order_and_terminal_passthrough() {
        let config = config();
        let repo = Arc::new(SqliteImportRepository::new(":memory:").unwrap());
        let ctx = ProcessorContext::new(ParentDomain::Product, &config, repo.clone()).unwrap();
        let mut chain =
            ProcessorChain::build(&ctx, &["price".to_string(), "text".to_string()]).unwrap();

        let mut item = Item::new(ParentDomain::Product, "P1");
        let rest = chain
            .process(
                &mut item,
                row(&[(0, "P1"), (1, "name"), (2, "Shoe"), (3, "10.00"), (9, "extra")]),
            )
            .unwrap();

        assert_eq!(rest, row(&[(0, "P1"), (9, "extra")]), "未映射列应原样传到末端");
        assert_eq!(item.lists.len(), 2);

        let names: Vec<String> = chain.stats().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["price", "text"]);

        let report = chain.finish(repo.as_ref());
        assert!(report.created >= 2);
    }

    #[test]
    fn test_failed_row_does_not_register_types() {
        let config = config();
        let repo = Arc::new(SqliteImportRepository::new(":memory:").unwrap());
        let ctx = ProcessorContext::new(ParentDomain::Product, &config, repo).unwrap();
        let mut chain =
            ProcessorChain::build(&ctx, &["price".to_string(), "text".to_string()]).unwrap();

        let mut item = Item::new(ParentDomain::Product, "P1");
        let err = chain
            .process(&mut item, row(&[(1, "warranty"), (2, "Two years"), (3, "5.00")]))
            .unwrap_err();

        assert!(err.is_validation());
        assert!(chain.registry().is_empty());
    }
}
