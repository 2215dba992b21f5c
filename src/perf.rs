// ==========================================
// 护理人力测算系统 - 性能统计
// ==========================================
// 按线程累计的计数器, 由 PerfGuard 在命令结束时汇总输出 (target = "perf")
// - SQL 语句数 / 慢 SQL 数: rusqlite profile 回调 (语句结束时触发)
// - 缓存命中 / 未命中: DimensioningCache 读取
// - 配额超限: AllocationLedger 拒绝的写入
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const ENV_PERF_SQL: &str = "STAFFING_DIMENSIONING_PERF_SQL";
const ENV_SLOW_SQL_MS: &str = "STAFFING_DIMENSIONING_SLOW_SQL_MS";

static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static PERF_DEPTH: Cell<u32> = Cell::new(0);
    static COUNTERS: Cell<PerfCounters> = Cell::new(PerfCounters::default());
}

/// 单线程计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfCounters {
    pub sql: u64,
    pub slow_sql: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub capacity_rejections: u64,
}

impl PerfCounters {
    fn since(self, start: PerfCounters) -> PerfCounters {
        PerfCounters {
            sql: self.sql.saturating_sub(start.sql),
            slow_sql: self.slow_sql.saturating_sub(start.slow_sql),
            cache_hits: self.cache_hits.saturating_sub(start.cache_hits),
            cache_misses: self.cache_misses.saturating_sub(start.cache_misses),
            capacity_rejections: self
                .capacity_rejections
                .saturating_sub(start.capacity_rejections),
        }
    }
}

/// 仅在 PerfGuard 作用域内累计
fn bump(f: impl FnOnce(&mut PerfCounters)) {
    if PERF_DEPTH.with(|d| d.get()) == 0 {
        return;
    }
    COUNTERS.with(|c| {
        let mut counters = c.get();
        f(&mut counters);
        c.set(counters);
    });
}

fn current() -> PerfCounters {
    COUNTERS.with(|c| c.get())
}

/// 记录一次缓存读取; 批量读取按键数计
pub fn record_cache_lookup(hits: usize, misses: usize) {
    bump(|c| {
        c.cache_hits = c.cache_hits.saturating_add(hits as u64);
        c.cache_misses = c.cache_misses.saturating_add(misses as u64);
    });
}

/// 记录一次因容量不足被拒绝的配额写入
pub fn record_capacity_rejection() {
    bump(|c| c.capacity_rejections = c.capacity_rejections.saturating_add(1));
}

fn env_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn shorten_sql(sql: &str, max_chars: usize) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}

/// 为连接安装 SQL 统计 (Debug 默认开启, Release 需环境变量)
///
/// - `STAFFING_DIMENSIONING_PERF_SQL=1` 强制开启, `=0` 关闭
/// - `STAFFING_DIMENSIONING_SLOW_SQL_MS` 慢 SQL 阈值 (毫秒)
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = std::env::var(ENV_PERF_SQL)
        .map(|v| env_flag(&v))
        .unwrap_or(cfg!(debug_assertions));

    if !enabled {
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var(ENV_SLOW_SQL_MS)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.profile(Some(on_statement_finished));
}

/// 仅在已开启统计的连接上注册
fn on_statement_finished(sql: &str, duration: Duration) {
    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    let slow = threshold > 0 && ms >= threshold;
    if slow {
        tracing::warn!(
            target: "slow_sql",
            duration_ms = ms,
            sql = %shorten_sql(sql, 400),
            "slow sql"
        );
    }

    bump(|c| {
        c.sql = c.sql.saturating_add(1);
        if slow {
            c.slow_sql = c.slow_sql.saturating_add(1);
        }
    });
}

/// 命令级统计: 耗时、SQL 数、缓存命中、配额拒绝
///
/// ```ignore
/// let _perf = staffing_dimensioning::perf::PerfGuard::new("cmd.allocate_slot");
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    counters_start: PerfCounters,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        PERF_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            op,
            start: Instant::now(),
            counters_start: current(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// 自 Guard 创建以来本线程的计数
    pub fn counters(&self) -> PerfCounters {
        current().since(self.counters_start)
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let c = self.counters();
        tracing::info!(
            target: "perf",
            op = self.op,
            elapsed_ms = self.elapsed_ms(),
            sql_count = c.sql,
            slow_sql_count = c.slow_sql,
            cache_hits = c.cache_hits,
            cache_misses = c.cache_misses,
            capacity_rejections = c.capacity_rejections,
            "done"
        );

        PERF_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flag_spellings() {
        for v in ["1", "true", " YES ", "on"] {
            assert!(env_flag(v));
        }
        assert!(!env_flag("0"));
        assert!(!env_flag("off"));
    }

    #[test]
    fn test_shorten_sql_flattens_whitespace() {
        let sql = "SELECT *\nFROM   bed_census\nWHERE unit_id = ?1";
        assert_eq!(shorten_sql(sql, 200), "SELECT * FROM bed_census WHERE unit_id = ?1");
        assert_eq!(shorten_sql(sql, 6), "SELECT…");
    }

    #[test]
    fn test_guard_counts_finished_statements() {
        std::env::set_var(ENV_PERF_SQL, "1");
        let mut conn = Connection::open_in_memory().unwrap();
        install_sqlite_tracing(&mut conn);

        let guard = PerfGuard::new("test.sql");
        conn.execute("CREATE TABLE bed (bed_id TEXT)", []).unwrap();
        conn.execute("INSERT INTO bed VALUES ('B1')", []).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM bed", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
        assert!(guard.counters().sql >= 3);
    }

    #[test]
    fn test_domain_counters_only_inside_guard() {
        record_cache_lookup(1, 0);
        record_capacity_rejection();

        let guard = PerfGuard::new("test.domain");
        record_cache_lookup(2, 1);
        record_cache_lookup(0, 1);
        record_capacity_rejection();
        let c = guard.counters();
        assert_eq!(c.cache_hits, 2);
        assert_eq!(c.cache_misses, 2);
        assert_eq!(c.capacity_rejections, 1);
        drop(guard);

        let before = current();
        record_cache_lookup(5, 5);
        assert_eq!(current(), before);
    }
}
