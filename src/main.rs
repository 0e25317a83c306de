// ==========================================
// 产线停机核心 - 命令行入口
// ==========================================
// 用法:
//   line-downtime create <json|->
//   line-downtime update <event_id> <json|->
//   line-downtime delete <event_id>
//   line-downtime get <event_id>
//   line-downtime list <run_id>
//   line-downtime resolve-run <json|->
//   line-downtime resolve-catalog <json|->
// 输入/输出均为 JSON；"-" 表示从标准输入读取
// 数据库路径: LINE_DOWNTIME_DB_PATH 环境变量，否则系统数据目录
// 日志格式: LINE_DOWNTIME_LOG_FORMAT=json 时输出 JSON 日志（stderr）
// ==========================================

use std::io::Read;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;

use line_downtime::api::{ApiError, DowntimeApi, ResolveCatalogRequest, ResolveRunRequest};
use line_downtime::db::{get_default_db_path, open_shared_connection};
use line_downtime::domain::DowntimeEventInput;

const USAGE: &str = "用法: line-downtime <create|update|delete|get|list|resolve-run|resolve-catalog> [参数]";

fn main() -> ExitCode {
    match std::env::var("LINE_DOWNTIME_LOG_FORMAT").as_deref() {
        Ok("json") => line_downtime::logging::init_json(),
        _ => line_downtime::logging::init(),
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // 业务拒绝以错误码 JSON 输出，其余错误走日志
            if let Some(api_err) = e.downcast_ref::<ApiError>() {
                print_json(&api_err.to_response());
            } else {
                tracing::error!("{:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let command = args.next().ok_or_else(|| anyhow!(USAGE))?;

    let db_path = get_default_db_path();
    tracing::info!(version = line_downtime::VERSION, db_path = %db_path, "{}", line_downtime::APP_NAME);

    let conn = open_shared_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    let api = DowntimeApi::from_connection(conn)?;

    match command.as_str() {
        "create" => {
            let input: DowntimeEventInput = read_json_arg(args.next())?;
            print_json(&api.create_downtime_event(&input)?);
        }
        "update" => {
            let event_id = args.next().ok_or_else(|| anyhow!("缺少 event_id"))?;
            let input: DowntimeEventInput = read_json_arg(args.next())?;
            print_json(&api.update_downtime_event(&event_id, &input)?);
        }
        "delete" => {
            let event_id = args.next().ok_or_else(|| anyhow!("缺少 event_id"))?;
            api.delete_downtime_event(&event_id)?;
            print_json(&serde_json::json!({ "deleted": event_id }));
        }
        "get" => {
            let event_id = args.next().ok_or_else(|| anyhow!("缺少 event_id"))?;
            print_json(&api.get_downtime_event(&event_id)?);
        }
        "list" => {
            let run_id = args.next().ok_or_else(|| anyhow!("缺少 run_id"))?;
            print_json(&api.list_downtime_events_by_run(&run_id)?);
        }
        "resolve-run" => {
            let request: ResolveRunRequest = read_json_arg(args.next())?;
            let run_id = api.resolve_run_id(&request)?;
            print_json(&serde_json::json!({ "run_id": run_id }));
        }
        "resolve-catalog" => {
            let request: ResolveCatalogRequest = read_json_arg(args.next())?;
            print_json(&api.resolve_catalog_entry(&request)?);
        }
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }

    Ok(())
}

fn read_json_arg<T: serde::de::DeserializeOwned>(arg: Option<String>) -> Result<T> {
    let raw = match arg.as_deref() {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("读取标准输入失败")?;
            buf
        }
        Some(text) => text.to_string(),
    };
    serde_json::from_str(&raw).map_err(|e| ApiError::InvalidInput(format!("JSON 解析失败: {}", e)).into())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::error!("序列化输出失败: {}", e),
    }
}
