// ==========================================
// 商品导入对账引擎 - 切块数据模型
// ==========================================
// 用途: 原始行 → 映射 → 逻辑子记录（Chunk）
// 生命周期: 仅在单行导入流程内
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 原始行（列位置 → 值）
///
/// 缺失的列位置不出现在 map 中；空单元格以空字符串出现
pub type RawRow = BTreeMap<usize, String>;

/// 字段映射: 有序的 (位置, 领域键) 列表
///
/// 同一领域键在当前块内再次出现即开启新块，块数量由数据决定
pub type FieldMapping<P = usize> = Vec<(P, String)>;

// ==========================================
// Chunk - 逻辑子记录
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    fields: BTreeMap<String, String>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// 原始值（未裁剪）
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// 裁剪后的非空值；缺失或空白均返回 None
    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// 裁剪后的值，缺失/空白时使用默认值
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Chunk {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut chunk = Chunk::new();
        for (k, v) in iter {
            chunk.insert(k, v);
        }
        chunk
    }
}

// ==========================================
// NaturalKey - 自然键
// ==========================================
// 跨多次导入识别"同一个"关联的领域元组
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

// ==========================================
// TypeRequest - 类型注册请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeRequest {
    pub scope: String,  // 仓储作用域，如 "product/lists/type"
    pub domain: String, // 领域，如 "price"
    pub code: String,   // 类型编码
}
