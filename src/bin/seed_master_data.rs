// ==========================================
// 产线停机核心 - 主数据导入工具
// ==========================================
// 用法: seed_master_data <runs.csv> <catalog.csv> [db_path]
// runs.csv 表头:    run_id,plant,line,shift,start_time,end_time
// catalog.csv 表头: master_id,line,category,type,detail,display_name,color,sort_order
// 两个文件在同一事务内写入，任一行失败整体回滚
// ==========================================

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;

use line_downtime::config::ConfigManager;
use line_downtime::db::{get_default_db_path, open_shared_connection};
use line_downtime::domain::{DowntimeMasterEntry, ProductionRun};
use line_downtime::engine::TimeNormalizer;
use line_downtime::repository::{DowntimeMasterRepository, ProductionRunRepository};

type RawRecord = HashMap<String, String>;

fn main() -> Result<()> {
    line_downtime::logging::init();

    let mut args = std::env::args().skip(1);
    let runs_path = args
        .next()
        .ok_or_else(|| anyhow!("用法: seed_master_data <runs.csv> <catalog.csv> [db_path]"))?;
    let catalog_path = args.next().ok_or_else(|| anyhow!("缺少 catalog.csv 路径"))?;
    let db_path = args.next().unwrap_or_else(get_default_db_path);

    let conn = open_shared_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    let rules = ConfigManager::new(conn.clone()).load_rules()?;
    let normalizer = TimeNormalizer::new(rules.local_offset());

    let runs = read_csv(Path::new(&runs_path))?
        .iter()
        .enumerate()
        .map(|(idx, row)| to_run(row, &normalizer).with_context(|| format!("{} 第 {} 行", runs_path, idx + 2)))
        .collect::<Result<Vec<_>>>()?;
    let entries = read_csv(Path::new(&catalog_path))?
        .iter()
        .enumerate()
        .map(|(idx, row)| to_entry(row).with_context(|| format!("{} 第 {} 行", catalog_path, idx + 2)))
        .collect::<Result<Vec<_>>>()?;

    {
        let mut guard = conn.lock().map_err(|e| anyhow!("锁获取失败: {}", e))?;
        let tx = guard.transaction()?;
        for run in &runs {
            ProductionRunRepository::insert_in(&tx, run)
                .with_context(|| format!("写入批次失败: {}", run.run_id))?;
        }
        for entry in &entries {
            DowntimeMasterRepository::insert_in(&tx, entry)
                .with_context(|| format!("写入主数据失败: {}", entry.master_id))?;
        }
        tx.commit()?;
    }

    tracing::info!(
        db_path = %db_path,
        runs = runs.len(),
        catalog_entries = entries.len(),
        "主数据导入完成"
    );
    Ok(())
}

/// 读取 CSV 为表头映射（跳过全空行）
fn read_csv(path: &Path) -> Result<Vec<RawRecord>> {
    if !path.exists() {
        bail!("文件不存在: {}", path.display());
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: RawRecord = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();

        if row.values().all(|v| v.is_empty()) {
            continue;
        }
        records.push(row);
    }
    Ok(records)
}

fn required<'a>(row: &'a RawRecord, column: &str) -> Result<&'a str> {
    optional(row, column).ok_or_else(|| anyhow!("缺少必填列: {}", column))
}

fn optional<'a>(row: &'a RawRecord, column: &str) -> Option<&'a str> {
    row.get(column).map(String::as_str).filter(|v| !v.is_empty())
}

fn to_run(row: &RawRecord, normalizer: &TimeNormalizer) -> Result<ProductionRun> {
    let start_time = normalizer.normalize(required(row, "start_time")?)?.local;
    let end_time = optional(row, "end_time")
        .map(|raw| normalizer.normalize(raw).map(|t| t.local))
        .transpose()?;

    if let Some(end) = end_time {
        if end < start_time {
            bail!("结束时间早于开始时间");
        }
    }

    Ok(ProductionRun {
        run_id: required(row, "run_id")?.to_string(),
        plant: required(row, "plant")?.to_string(),
        line: required(row, "line")?.to_string(),
        shift: required(row, "shift")?.to_string(),
        start_time,
        end_time,
    })
}

fn to_entry(row: &RawRecord) -> Result<DowntimeMasterEntry> {
    let sort_order = optional(row, "sort_order")
        .map(|raw| raw.parse::<i64>().with_context(|| format!("sort_order 非整数: {}", raw)))
        .transpose()?;

    Ok(DowntimeMasterEntry {
        master_id: required(row, "master_id")?.to_string(),
        line: required(row, "line")?.to_string(),
        category: required(row, "category")?.to_string(),
        type_label: required(row, "type")?.to_string(),
        detail: optional(row, "detail").map(str::to_string),
        display_name: optional(row, "display_name").map(str::to_string),
        color: optional(row, "color").map(str::to_string),
        sort_order,
    })
}
