// ==========================================
// 商品导入对账引擎 - 领域类型定义
// ==========================================
// 职责: 关联域 / 父实体域 / 状态常量
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 启用状态
pub const STATUS_ENABLED: i32 = 1;

/// 标签最大长度（字符数）
pub const LABEL_MAX_LEN: usize = 255;

// ==========================================
// 关联域 (List Domain)
// ==========================================
// 父实体通过关联列表挂接的子实体种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListDomain {
    Text,
    Media,
    Price,
    Attribute,
    Catalog,
    Product,
    Supplier,
}

impl ListDomain {
    pub const ALL: [ListDomain; 7] = [
        ListDomain::Text,
        ListDomain::Media,
        ListDomain::Price,
        ListDomain::Attribute,
        ListDomain::Catalog,
        ListDomain::Product,
        ListDomain::Supplier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListDomain::Text => "text",
            ListDomain::Media => "media",
            ListDomain::Price => "price",
            ListDomain::Attribute => "attribute",
            ListDomain::Catalog => "catalog",
            ListDomain::Product => "product",
            ListDomain::Supplier => "supplier",
        }
    }

    /// 被引用实体是否由关联独占（关联删除时一并删除）
    pub fn owns_ref(&self) -> bool {
        matches!(self, ListDomain::Text | ListDomain::Media | ListDomain::Price)
    }

    /// 是否按处理顺序重排 position
    ///
    /// 纯身份关联（目录/商品/供应商）不重排已存在的关联
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            ListDomain::Text | ListDomain::Media | ListDomain::Price | ListDomain::Attribute
        )
    }
}

impl fmt::Display for ListDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ListDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ListDomain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("未知关联域: {}", s))
    }
}

// ==========================================
// 父实体域 (Parent Domain)
// ==========================================
// Catalog 为树形父实体（逐节点对账）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentDomain {
    Product,
    Catalog,
}

impl ParentDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentDomain::Product => "product",
            ParentDomain::Catalog => "catalog",
        }
    }

    /// 关联类型的仓储作用域，例如 "product/lists/type"
    pub fn list_type_scope(&self) -> String {
        format!("{}/lists/type", self.as_str())
    }

    /// 属性类型的仓储作用域，例如 "product/property/type"
    pub fn property_type_scope(&self) -> String {
        format!("{}/property/type", self.as_str())
    }

    /// 关联字段键，例如 "product.lists.type"
    pub fn list_key(&self, field: &str) -> String {
        format!("{}.lists.{}", self.as_str(), field)
    }

    /// 作为链接目标时对应的关联域
    pub fn as_list_domain(&self) -> ListDomain {
        match self {
            ParentDomain::Product => ListDomain::Product,
            ParentDomain::Catalog => ListDomain::Catalog,
        }
    }

    /// 父实体自身字段键，例如 "product.code"
    pub fn item_key(&self, field: &str) -> String {
        format!("{}.{}", self.as_str(), field)
    }
}

impl fmt::Display for ParentDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ParentDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(ParentDomain::Product),
            "catalog" => Ok(ParentDomain::Catalog),
            other => Err(format!("未知父实体域: {}", other)),
        }
    }
}

/// 按字符边界截断标签
pub fn truncate_label(value: &str) -> String {
    value.trim().chars().take(LABEL_MAX_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_domain_roundtrip_names() {
        for domain in ListDomain::ALL {
            assert_eq!(domain.as_str().parse::<ListDomain>().unwrap(), domain);
        }
        assert!("warranty".parse::<ListDomain>().is_err());
    }

    #[test]
    fn test_owned_and_ordered_kinds() {
        assert!(ListDomain::Text.owns_ref());
        assert!(!ListDomain::Attribute.owns_ref());
        assert!(!ListDomain::Catalog.is_ordered());
        assert!(ListDomain::Price.is_ordered());
    }

    #[test]
    fn test_parent_scopes() {
        assert_eq!(ParentDomain::Product.list_type_scope(), "product/lists/type");
        assert_eq!(ParentDomain::Catalog.list_key("type"), "catalog.lists.type");
        assert_eq!(ParentDomain::Product.property_type_scope(), "product/property/type");
    }

    #[test]
    fn test_truncate_label_multibyte() {
        let long = "é".repeat(300);
        let label = truncate_label(&long);
        assert_eq!(label.chars().count(), LABEL_MAX_LEN);
    }
}
