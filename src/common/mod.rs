// ==========================================
// 护理人力测算系统 - 公共工具模块
// ==========================================

pub mod value_parser;

pub use value_parser::{parse_decimal, parse_percentage, ValueParseError};
