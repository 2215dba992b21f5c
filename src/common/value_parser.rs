// ==========================================
// 护理人力测算系统 - 数值清洗
// ==========================================
// 职责: 上游数据(快照/配置)中的数值字符串统一在这里解析
// 输入约定:
// - 允许首尾空白、货币前缀 (R$ / $ / € / ¥)、内部空格
// - 允许逗号小数 ("0,85") 与千分位 ("1.234,56" / "1,234.56")
// - 同时出现 ',' 与 '.' 时, 最后出现者为小数点
// - 仅出现 ',' 且只出现一次时视为小数点; 多次出现视为千分位
// - 仅出现 '.' 且多次出现时视为千分位
// 输出约定:
// - parse_decimal: 原值 (忽略末尾 '%')
// - parse_percentage: 小数形式; 带 '%' 时除以 100, 否则原样返回
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueParseError {
    #[error("数值为空")]
    Empty,

    #[error("无法解析的数值: {0}")]
    Invalid(String),
}

const CURRENCY_PREFIXES: [&str; 4] = ["R$", "$", "€", "¥"];

/// 解析数值字符串
///
/// # 示例
/// ```
/// use staffing_dimensioning::common::value_parser::parse_decimal;
///
/// assert_eq!(parse_decimal("1.234,56").unwrap(), 1234.56);
/// assert_eq!(parse_decimal(" R$ 10,50 ").unwrap(), 10.5);
/// assert_eq!(parse_decimal("85%").unwrap(), 85.0);
/// ```
pub fn parse_decimal(raw: &str) -> Result<f64, ValueParseError> {
    let (normalized, _) = normalize(raw)?;
    parse_normalized(raw, &normalized)
}

/// 解析百分比字符串为小数
///
/// # 示例
/// ```
/// use staffing_dimensioning::common::value_parser::parse_percentage;
///
/// assert_eq!(parse_percentage("85%").unwrap(), 0.85);
/// assert_eq!(parse_percentage("0,85").unwrap(), 0.85);
/// ```
pub fn parse_percentage(raw: &str) -> Result<f64, ValueParseError> {
    let (normalized, had_percent) = normalize(raw)?;
    let value = parse_normalized(raw, &normalized)?;
    Ok(if had_percent { value / 100.0 } else { value })
}

/// 去除装饰字符并统一小数点, 返回 (规范化字符串, 是否带百分号)
fn normalize(raw: &str) -> Result<(String, bool), ValueParseError> {
    let mut s = raw.trim();
    if s.is_empty() {
        return Err(ValueParseError::Empty);
    }

    for prefix in CURRENCY_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start();
            break;
        }
    }

    let had_percent = s.ends_with('%');
    let s = s.trim_end_matches('%');

    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ValueParseError::Empty);
    }

    let last_comma = compact.rfind(',');
    let last_dot = compact.rfind('.');
    let comma_count = compact.matches(',').count();
    let dot_count = compact.matches('.').count();

    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) if comma_count == 1 => compact.replace(',', "."),
        (Some(_), None) => compact.replace(',', ""),
        (None, Some(_)) if dot_count > 1 => compact.replace('.', ""),
        _ => compact,
    };

    Ok((normalized, had_percent))
}

fn parse_normalized(raw: &str, normalized: &str) -> Result<f64, ValueParseError> {
    let value: f64 = normalized
        .parse()
        .map_err(|_| ValueParseError::Invalid(raw.to_string()))?;
    if !value.is_finite() {
        return Err(ValueParseError::Invalid(raw.to_string()));
    }
    Ok(value)
}
