// ==========================================
// 商品导入对账引擎 - 导入任务
// ==========================================
// 职责: 读取源文件 → 分批 → 父实体查找/新建 → 处理链对账 → 保存 → 刷新类型注册表
// 红线:
// - 每行在父实体副本上执行，整条链成功才保存（行级原子）
// - 类型校验失败中止整次导入，中止前仍刷新类型注册表
// - 类型注册表在任务结束时恰好刷新一次
// ==========================================

use crate::config::{config_keys, ImportConfigReader};
use crate::domain::types::truncate_label;
use crate::domain::{Chunk, FieldMapping, Item, ListDomain, ParentDomain, RawRow};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_chunker::{chunk, peek_chunks};
use crate::importer::file_parser::{parse_delimiter, SourceReader, UniversalReader};
use crate::importer::list_reconciler::{parse_status, ReconcileStats};
use crate::importer::processor::{ProcessorChain, ProcessorContext};
use crate::importer::type_registry::FlushReport;
use crate::repository::ImportRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// 默认每批行数
pub const DEFAULT_MAX_SIZE: usize = 1000;
/// 默认跳过的表头行数
pub const DEFAULT_SKIP_LINES: usize = 1;

// ==========================================
// ImportReport - 导入结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub parent: ParentDomain,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: i64,

    pub total_rows: usize,
    pub processed_rows: usize,
    pub skipped_rows: usize, // 缺少父实体编码
    pub failed_rows: usize,  // 行级错误（字段值无效等）
    pub created_items: usize,
    pub updated_items: usize,

    pub lists: BTreeMap<String, ReconcileStats>, // 处理器名 → 对账统计
    pub types: FlushReport,
}

impl ImportReport {
    fn new(parent: ParentDomain) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            parent,
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            total_rows: 0,
            processed_rows: 0,
            skipped_rows: 0,
            failed_rows: 0,
            created_items: 0,
            updated_items: 0,
            lists: BTreeMap::new(),
            types: FlushReport::default(),
        }
    }
}

/// 父实体字段键
struct ItemKeys {
    code: String,
    label: String,
    type_code: String,
    status: String,
    parent: Option<String>, // 仅目录树
}

impl ItemKeys {
    fn new(parent: ParentDomain) -> Self {
        Self {
            code: parent.item_key("code"),
            label: parent.item_key("label"),
            type_code: parent.item_key("type"),
            status: parent.item_key("status"),
            parent: (parent == ParentDomain::Catalog).then(|| parent.item_key("parent")),
        }
    }
}

/// 单次运行状态
struct RunState {
    chain: ProcessorChain,
    mapping: FieldMapping,
    keys: ItemKeys,
    nodes: HashMap<String, Option<i64>>, // 目录编码 → ID（含本次新建节点）
    report: ImportReport,
}

// ==========================================
// ImportJob - 导入任务
// ==========================================
pub struct ImportJob<R: ImportRepository + 'static> {
    parent: ParentDomain,
    repo: Arc<R>,
    config: Arc<dyn ImportConfigReader>,
}

impl<R: ImportRepository + 'static> ImportJob<R> {
    pub fn new(parent: ParentDomain, repo: Arc<R>, config: Arc<dyn ImportConfigReader>) -> Self {
        Self {
            parent,
            repo,
            config,
        }
    }

    /// 导入文件（.csv / .xlsx / .xls）
    #[instrument(skip(self), fields(parent = %self.parent))]
    pub fn run_file(&self, path: &Path) -> ImportResult<ImportReport> {
        let reader = match self.config.get(config_keys::CSV_DELIMITER)? {
            Some(raw) => UniversalReader::with_csv_delimiter(parse_delimiter(&raw)?),
            None => UniversalReader::default(),
        };
        let rows = reader.read_rows(path)?;
        self.run_rows(rows)
    }

    /// 导入原始行（含表头行）
    #[instrument(skip(self, rows), fields(parent = %self.parent, rows = rows.len()))]
    pub fn run_rows(&self, rows: Vec<RawRow>) -> ImportResult<ImportReport> {
        let config = self.config.as_ref();
        let ctx = ProcessorContext::new(self.parent, config, Arc::clone(&self.repo))?;
        let chain = ProcessorChain::from_config(&ctx)?;

        let mapping_key = config_keys::mapping("item");
        let mapping = config.get_mapping(&mapping_key)?.ok_or_else(|| {
            ImportError::Configuration(format!("缺少父实体字段映射 {}", mapping_key))
        })?;
        let skip = config.get_usize(config_keys::SKIP_LINES, DEFAULT_SKIP_LINES)?;
        let max_size = config
            .get_usize(config_keys::MAX_SIZE, DEFAULT_MAX_SIZE)?
            .max(1);

        let mut state = RunState {
            chain,
            mapping,
            keys: ItemKeys::new(self.parent),
            nodes: HashMap::new(),
            report: ImportReport::new(self.parent),
        };

        let mut rows = rows.into_iter().skip(skip);
        let mut outcome = Ok(());
        loop {
            let batch: Vec<RawRow> = rows.by_ref().take(max_size).collect();
            if batch.is_empty() {
                break;
            }
            state.report.total_rows += batch.len();
            if let Err(e) = self.process_batch(&mut state, batch) {
                outcome = Err(e);
                break;
            }
        }

        // 无论成功与否，类型注册表恰好刷新一次
        let RunState {
            chain, mut report, ..
        } = state;
        report.lists = chain.stats().into_iter().collect();
        report.types = chain.finish(self.repo.as_ref());
        report.finished_at = Utc::now();
        report.elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();

        if let Err(e) = outcome {
            error!(run_id = %report.run_id, error = %e, "导入中止");
            return Err(e);
        }

        info!(
            run_id = %report.run_id,
            processed = report.processed_rows,
            created = report.created_items,
            updated = report.updated_items,
            failed = report.failed_rows,
            types_created = report.types.created,
            elapsed_ms = report.elapsed_ms,
            "导入完成"
        );
        Ok(report)
    }

    fn process_batch(&self, state: &mut RunState, batch: Vec<RawRow>) -> ImportResult<()> {
        // === 步骤 1: 批量预处理（链接编码一次解析）===
        state.chain.prepare(&batch)?;

        // === 步骤 2: 批量加载已有父实体 ===
        let heads: Vec<Chunk> = batch
            .iter()
            .map(|row| {
                peek_chunks(row, &state.mapping)
                    .into_iter()
                    .next()
                    .unwrap_or_default()
            })
            .collect();
        let mut codes: Vec<String> = heads
            .iter()
            .filter_map(|c| c.get(&state.keys.code).map(str::to_string))
            .collect();
        codes.sort();
        codes.dedup();

        let mut items: HashMap<String, Item> = self
            .repo
            .find_items(self.parent, &codes)?
            .into_iter()
            .map(|item| (item.code.clone(), item))
            .collect();

        // === 步骤 3: 目录树父节点批量解析 ===
        if let Some(parent_key) = &state.keys.parent {
            let missing: Vec<String> = heads
                .iter()
                .filter_map(|c| c.get(parent_key))
                .filter(|code| !state.nodes.contains_key(*code))
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                let found = self.repo.resolve_codes(ListDomain::Catalog, &missing)?;
                for code in missing {
                    let id = found.get(&code).copied();
                    state.nodes.entry(code).or_insert(id);
                }
            }
        }

        // === 步骤 4: 逐行处理 ===
        for row in batch {
            self.process_row(state, &mut items, row)?;
        }
        Ok(())
    }

    fn process_row(
        &self,
        state: &mut RunState,
        items: &mut HashMap<String, Item>,
        mut row: RawRow,
    ) -> ImportResult<()> {
        let head = chunk(&mut row, &state.mapping)
            .into_iter()
            .next()
            .unwrap_or_default();
        let Some(code) = head.get(&state.keys.code).map(str::to_string) else {
            warn!(key = %state.keys.code, "缺少父实体编码，跳过该行");
            state.report.skipped_rows += 1;
            return Ok(());
        };

        // 在副本上执行，整行成功才保存
        let mut item = items
            .get(&code)
            .cloned()
            .unwrap_or_else(|| Item::new(self.parent, code.clone()));
        let is_new = item.id.is_none();

        let result = self
            .apply_item_fields(state, &mut item, &head)
            .and_then(|_| state.chain.process(&mut item, row));
        if let Err(e) = result {
            if e.is_row_error() {
                error!(code = %code, error = %e, "行处理失败，跳过");
                state.report.failed_rows += 1;
                return Ok(());
            }
            return Err(e);
        }

        self.repo.save_item(&mut item)?;
        state.report.processed_rows += 1;

        if is_new {
            state.report.created_items += 1;
            if let Some(id) = item.id {
                state
                    .chain
                    .register_target(self.parent.as_list_domain(), &code, id);
                if self.parent == ParentDomain::Catalog {
                    state.nodes.insert(code.clone(), Some(id));
                }
            }
        } else {
            state.report.updated_items += 1;
        }

        items.insert(code, item);
        Ok(())
    }

    /// 父实体自身字段（仅覆写块中出现的字段）
    fn apply_item_fields(&self, state: &RunState, item: &mut Item, head: &Chunk) -> ImportResult<()> {
        let keys = &state.keys;
        if let Some(label) = head.get(&keys.label) {
            item.label = truncate_label(label);
        }
        if let Some(type_code) = head.get(&keys.type_code) {
            item.type_code = type_code.to_string();
        }
        if let Some(status) = parse_status(head, &keys.status)? {
            item.status = status;
        }

        if let Some(parent_code) = keys.parent.as_ref().and_then(|k| head.get(k)) {
            if parent_code == item.code {
                return Err(ImportError::InvalidValue {
                    field: keys.parent.clone().unwrap_or_default(),
                    message: format!("节点不能作为自身父节点: {}", parent_code),
                });
            }
            match state.nodes.get(parent_code).copied().flatten() {
                Some(id) => item.parent_id = Some(id),
                None => warn!(code = %item.code, parent = %parent_code, "父节点不存在，保持原父节点"),
            }
        }
        Ok(())
    }
}
