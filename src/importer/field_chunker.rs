// ==========================================
// 商品导入对账引擎 - 字段切块器
// ==========================================
// 职责: 原始行 + 位置映射 → 有序逻辑子记录（Chunk）
//       单字段多值拆分（如一个单元格内多个 URL）
// 规则: 领域键在当前块内重复出现即开启新块
// ==========================================

use crate::config::config_keys;
use crate::domain::Chunk;
use crate::importer::error::{ImportError, ImportResult};
use std::collections::BTreeMap;

/// 默认多值分隔符
pub const DEFAULT_SEPARATOR: char = '\n';

/// 切块并消费已映射的列位置
///
/// # 参数
/// - row: 原始行（位置 → 值），已映射位置会被移除
/// - mapping: 有序 (位置, 领域键) 列表
///
/// # 返回
/// - 按源顺序排列的 Chunk 列表
///
/// # 说明
/// - 位置在原始行中不存在时，该键不写入块（区别于"存在但为空"）
/// - 位置类型泛型化：CSV 为列号，XML 节点为属性名
pub fn chunk<P: Ord>(row: &mut BTreeMap<P, String>, mapping: &[(P, String)]) -> Vec<Chunk> {
    build_chunks(mapping, |pos| row.remove(pos))
}

/// 切块但不消费原始行（批量预处理用）
pub fn peek_chunks<P: Ord>(row: &BTreeMap<P, String>, mapping: &[(P, String)]) -> Vec<Chunk> {
    build_chunks(mapping, |pos| row.get(pos).cloned())
}

fn build_chunks<P, F>(mapping: &[(P, String)], mut take: F) -> Vec<Chunk>
where
    F: FnMut(&P) -> Option<String>,
{
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut idx = 0;

    for (pos, key) in mapping {
        if chunks.get(idx).is_some_and(|c| c.contains(key)) {
            idx += 1;
        }

        if let Some(value) = take(pos) {
            while chunks.len() <= idx {
                chunks.push(Chunk::new());
            }
            chunks[idx].insert(key.clone(), value);
        }
    }

    chunks
}

/// 多值拆分
///
/// # 返回
/// - 按原顺序、已裁剪、去除空段的值列表
pub fn split_values(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// 解析分隔符配置（支持 "\n" / "\t" 转义写法）
pub fn parse_separator(raw: &str) -> ImportResult<char> {
    let unescaped = match raw {
        "\\n" => "\n",
        "\\t" => "\t",
        "\\r" => "\r",
        other => other,
    };

    let mut chars = unescaped.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ImportError::ConfigValueError {
            key: config_keys::SEPARATOR.to_string(),
            value: raw.to_string(),
            message: "分隔符必须为单个字符".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> BTreeMap<usize, String> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (i, v.to_string()))
            .collect()
    }

    fn mapping(keys: &[(usize, &str)]) -> Vec<(usize, String)> {
        keys.iter().map(|(p, k)| (*p, k.to_string())).collect()
    }

    #[test]
    fn test_repeated_keys_start_new_chunk() {
        let mut raw = row(&["x", "y", "z", "w"]);
        let chunks = chunk(&mut raw, &mapping(&[(0, "A"), (1, "B"), (2, "A"), (3, "B")]));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Chunk::from_iter([("A", "x"), ("B", "y")]));
        assert_eq!(chunks[1], Chunk::from_iter([("A", "z"), ("B", "w")]));
        assert!(raw.is_empty(), "已映射的列应被消费");
    }

    #[test]
    fn test_distinct_keys_single_chunk() {
        let mut raw = row(&["x", "y", "z"]);
        let chunks = chunk(&mut raw, &mapping(&[(0, "A"), (1, "B"), (2, "C")]));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 3);
    }

    #[test]
    fn test_unmapped_positions_remain() {
        let mut raw = row(&["x", "y", "z"]);
        let chunks = chunk(&mut raw, &mapping(&[(1, "A")]));

        assert_eq!(chunks.len(), 1);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.get(&0).map(String::as_str), Some("x"));
        assert_eq!(raw.get(&2).map(String::as_str), Some("z"));
    }

    #[test]
    fn test_missing_position_is_absent_not_blank() {
        let mut raw = BTreeMap::new();
        raw.insert(0usize, "".to_string());
        let chunks = chunk(&mut raw, &mapping(&[(0, "A"), (1, "B")]));

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("A"));
        assert_eq!(chunks[0].raw("A"), Some(""));
        assert!(!chunks[0].contains("B"));
    }

    #[test]
    fn test_fully_missing_trailing_chunk_not_produced() {
        let mut raw = row(&["x", "y"]);
        let chunks = chunk(&mut raw, &mapping(&[(0, "A"), (1, "B"), (2, "A"), (3, "B")]));

        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_named_positions_for_nodes() {
        let mut attrs: BTreeMap<String, String> = BTreeMap::new();
        attrs.insert("lang".to_string(), "de".to_string());
        attrs.insert("value".to_string(), "Hallo".to_string());
        let map = vec![
            ("lang".to_string(), "text.languageid".to_string()),
            ("value".to_string(), "text.content".to_string()),
        ];

        let peeked = peek_chunks(&attrs, &map);
        assert_eq!(attrs.len(), 2, "peek 不应消费");

        let chunks = chunk(&mut attrs, &map);
        assert_eq!(peeked, chunks);
        assert_eq!(chunks[0].get("text.content"), Some("Hallo"));
    }

    #[test]
    fn test_split_values() {
        assert_eq!(split_values("a\n b \n\nc", '\n'), vec!["a", "b", "c"]);
        assert_eq!(split_values("single", '\n'), vec!["single"]);
        assert!(split_values("  ", '\n').is_empty());
        assert_eq!(split_values("x|y", '|'), vec!["x", "y"]);
    }

    #[test]
    fn test_parse_separator() {
        assert_eq!(parse_separator("\\n").unwrap(), '\n');
        assert_eq!(parse_separator("|").unwrap(), '|');
        assert!(parse_separator("").is_err());
        assert!(parse_separator("ab").is_err());
    }
}
