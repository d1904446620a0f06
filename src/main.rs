// ==========================================
// 通用记录引擎 - 命令行入口
// ==========================================
// 用法:
//   record-forge entities
//   record-forge import <db_path> <entity> <file>
//   record-forge copy <db_path> <entity> <id> [count]
//
// 结果以 JSON 输出到 stdout，日志输出到 stderr
// RECORD_FORGE_LOCALE: 错误提示语言（zh-CN / en，默认 zh-CN）
// ==========================================

use record_forge::catalog::{EntityCatalog, EntityDefinition};
use record_forge::config::{ConfigManager, ResilienceConfigReader};
use record_forge::engine::{CopyTransform, ErrorClassifier, ResilientCopyService};
use record_forge::importer::BatchImporter;
use record_forge::{RecordId, Session};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

const LOCALE_ENV: &str = "RECORD_FORGE_LOCALE";

const USAGE: &str = "用法:
  record-forge entities
  record-forge import <db_path> <entity> <file>
  record-forge copy <db_path> <entity> <id> [count]";

#[tokio::main]
async fn main() -> CliResult<()> {
    record_forge::logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let catalog = EntityCatalog::builtin()?;

    match args.first().map(String::as_str) {
        Some("entities") => list_entities(&catalog),
        Some("import") if args.len() == 4 => {
            import(&catalog, &args[1], &args[2], Path::new(&args[3]))
        }
        Some("copy") if args.len() == 4 || args.len() == 5 => {
            let id: i64 = args[3]
                .parse()
                .map_err(|_| format!("无效的记录 ID: {}", args[3]))?;
            let count: usize = match args.get(4) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| format!("无效的复制份数: {}", raw))?,
                None => 1,
            };
            copy(&catalog, &args[1], &args[2], RecordId(id), count).await
        }
        _ => {
            eprintln!("{}", USAGE);
            Err("参数错误".into())
        }
    }
}

fn list_entities(catalog: &EntityCatalog) -> CliResult<()> {
    for name in catalog.names() {
        if let Some(definition) = catalog.get(name) {
            let headers: Vec<&str> = definition
                .schema()
                .fields()
                .iter()
                .map(|f| f.description.as_str())
                .collect();
            println!("{}\t{}", name, headers.join(","));
        }
    }
    Ok(())
}

fn lookup<'a>(catalog: &'a EntityCatalog, entity: &str) -> CliResult<&'a EntityDefinition> {
    catalog.get(entity).ok_or_else(|| {
        format!(
            "未知实体: {}（可选: {}）",
            entity,
            catalog.names().join(", ")
        )
        .into()
    })
}

fn open_session(catalog: &EntityCatalog, db_path: &str) -> CliResult<Session> {
    let session = Session::open(db_path)?;
    catalog.ensure_tables(&session)?;
    Ok(session)
}

fn import(catalog: &EntityCatalog, db_path: &str, entity: &str, file: &Path) -> CliResult<()> {
    let definition = lookup(catalog, entity)?;
    let session = open_session(catalog, db_path)?;
    let config = definition.import_config()?;
    let repo = definition.repository();

    let bytes = std::fs::read(file)?;
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let result = BatchImporter::new().import_into(&session, repo.as_ref(), &bytes, extension, &config);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn copy(
    catalog: &EntityCatalog,
    db_path: &str,
    entity: &str,
    id: RecordId,
    count: usize,
) -> CliResult<()> {
    let definition = lookup(catalog, entity)?;
    let session = open_session(catalog, db_path)?;
    let config = ConfigManager::from_connection(session.connection())?;

    // Ctrl-C: 未开始的工作项记为跳过，已提交的保持提交
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let options = config.get_batch_copy_options().await?.with_cancel(cancel);
    let transform: Arc<dyn CopyTransform> = Arc::new(definition.copy_plan().clone());
    let mut service = ResilientCopyService::new(session, definition.repository());
    if let Ok(locale) = std::env::var(LOCALE_ENV) {
        service = service.with_classifier(ErrorClassifier::with_locale(&locale));
    }

    let report = service
        .copy_records_batch(&[id], transform, count, &options)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report.into_response())?);
    Ok(())
}
