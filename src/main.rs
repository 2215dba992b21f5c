// ==========================================
// 护理人力测算系统 - 命令行入口
// ==========================================
// 用法:
//   staffing-dimensioning hospital <hospital_id> [YYYY-MM-DD]
//   staffing-dimensioning scope <NETWORK|GROUP|REGION> <scope_id> [YYYY-MM-DD]
//   staffing-dimensioning dashboard <hospital_id>...
//   staffing-dimensioning sweep-cache [ttl_minutes]
// 数据库: STAFFING_DIMENSIONING_DB_PATH 或用户数据目录
// 日志: STAFFING_DIMENSIONING_LOG_JSON=1 输出 JSON 行
// ==========================================

use staffing_dimensioning::app::{commands, get_default_db_path, AppState};
use staffing_dimensioning::domain::cache::InvalidationScope;

const USAGE: &str = "usage: staffing-dimensioning <hospital|scope|dashboard|sweep-cache> [args...]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let json_logs = std::env::var("STAFFING_DIMENSIONING_LOG_JSON")
        .map(|v| matches!(v.trim(), "1" | "true"))
        .unwrap_or(false);
    if json_logs {
        staffing_dimensioning::logging::init_json();
    } else {
        staffing_dimensioning::logging::init();
    }

    tracing::info!(
        "{} v{}",
        staffing_dimensioning::APP_NAME,
        staffing_dimensioning::VERSION
    );

    let mut args = std::env::args().skip(1);
    let command = args.next().ok_or(USAGE)?;
    let rest: Vec<String> = args.map(|s| s.trim().to_string()).collect();

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);
    let state = AppState::new(db_path)?;

    let output = match command.as_str() {
        "hospital" => {
            let hospital_id = rest.first().cloned().ok_or(USAGE)?;
            commands::analyze_hospital(&state, hospital_id, rest.get(1).cloned()).await
        }
        "scope" => {
            let kind = rest.first().cloned().ok_or(USAGE)?;
            let scope_id = rest.get(1).cloned().ok_or(USAGE)?;
            commands::analyze_network_scope(&state, kind, scope_id, rest.get(2).cloned()).await
        }
        "dashboard" => {
            if rest.is_empty() {
                return Err(USAGE.into());
            }
            commands::hospital_dashboard(&state, rest, None).await
        }
        "sweep-cache" => {
            let ttl_minutes = match rest.first() {
                Some(raw) => raw.parse::<i64>()?,
                None => state.config.cache_ttl_minutes,
            };
            commands::invalidate(&state, InvalidationScope::Expired { ttl_minutes }).await
        }
        other => return Err(format!("未知命令: {}\n{}", other, USAGE).into()),
    };

    match output {
        Ok(json) => {
            println!("{}", json);
            Ok(())
        }
        Err(e) => {
            tracing::error!("命令执行失败: {}", e);
            Err(e.into())
        }
    }
}
