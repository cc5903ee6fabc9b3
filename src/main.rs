// ==========================================
// 商品导入对账引擎 - 命令行入口
// ==========================================
// 用法: item-import [--parent product|catalog] <db> <file> [config.json]
// - config.json 存在时先写入 config_kv，再以数据库配置执行导入
// ==========================================

use anyhow::{bail, Context};
use item_import::{logging, ConfigManager, ImportJob, ParentDomain, SqliteImportRepository};
use std::path::PathBuf;
use std::sync::Arc;

const USAGE: &str = "用法: item-import [--parent product|catalog] <db> <file> [config.json]";

struct Args {
    parent: ParentDomain,
    db: String,
    file: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut parent = ParentDomain::Product;
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--parent" => {
                let value = args.next().context(USAGE)?;
                parent = value.parse().map_err(anyhow::Error::msg)?;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let (Some(db), Some(file)) = (positional.next(), positional.next()) else {
        bail!(USAGE);
    };
    Ok(Args {
        parent,
        db,
        file: PathBuf::from(file),
        config: positional.next().map(PathBuf::from),
    })
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let args = parse_args()?;

    tracing::info!("商品导入对账引擎 v{}", item_import::VERSION);
    tracing::info!("使用数据库: {}", args.db);

    let repo = Arc::new(
        SqliteImportRepository::new(&args.db).context("数据库初始化失败")?,
    );
    let config = ConfigManager::from_connection(repo.connection())?;

    if let Some(path) = &args.config {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let count = config.load_from_json(&json)?;
        tracing::info!("已写入 {} 项配置", count);
    }

    let job = ImportJob::new(args.parent, repo, Arc::new(config));
    let report = job.run_file(&args.file)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
