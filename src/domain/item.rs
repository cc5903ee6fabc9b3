// ==========================================
// 商品导入对账引擎 - 父实体与关联模型
// ==========================================
// 红线: 被引用实体由其关联持有，关联之外无独立身份
// 用途: 导入层读写，仓储层持久化
// ==========================================

use crate::domain::types::{ListDomain, ParentDomain, STATUS_ENABLED};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// Item - 父实体（商品 / 目录节点）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Option<i64>,
    pub domain: ParentDomain,
    pub code: String,
    pub label: String,
    pub type_code: String,
    pub status: i32,
    pub parent_id: Option<i64>, // 目录树父节点

    pub lists: Vec<ListItem>,
    pub properties: Vec<PropertyItem>,

    // ===== 待删除缓冲（保存时一次性批量删除）=====
    #[serde(skip)]
    pub deleted_lists: Vec<i64>,
    #[serde(skip)]
    pub deleted_refs: Vec<(ListDomain, i64)>,
    #[serde(skip)]
    pub deleted_properties: Vec<i64>,
}

impl Item {
    /// 创建空白父实体
    pub fn new(domain: ParentDomain, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            id: None,
            domain,
            label: code.clone(),
            code,
            type_code: "default".to_string(),
            status: STATUS_ENABLED,
            parent_id: None,
            lists: Vec::new(),
            properties: Vec::new(),
            deleted_lists: Vec::new(),
            deleted_refs: Vec::new(),
            deleted_properties: Vec::new(),
        }
    }

    /// 查询某一关联域的关联（可选按关联类型过滤）
    pub fn list_items<'a>(
        &'a self,
        domain: ListDomain,
        list_types: Option<&'a [String]>,
    ) -> impl Iterator<Item = &'a ListItem> + 'a {
        self.lists
            .iter()
            .filter(move |li| li.domain == domain && in_scope(&li.type_code, list_types))
    }

    /// 取出某一关联域的关联（从父实体中移除），其余关联保持原样
    pub fn take_list_items(
        &mut self,
        domain: ListDomain,
        list_types: Option<&[String]>,
    ) -> Vec<ListItem> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.lists)
            .into_iter()
            .partition(|li| li.domain == domain && in_scope(&li.type_code, list_types));
        self.lists = rest;
        taken
    }

    pub fn add_list_item(&mut self, item: ListItem) {
        self.lists.push(item);
    }

    /// 标记关联删除
    ///
    /// # 参数
    /// - items: 待删除关联
    /// - with_refs: 是否一并删除独占的被引用实体
    pub fn delete_list_items(&mut self, items: Vec<ListItem>, with_refs: bool) {
        for item in items {
            if let Some(id) = item.id {
                self.deleted_lists.push(id);
            }
            if with_refs {
                if let Some(ref_id) = item.ref_item.as_ref().and_then(RefItem::id) {
                    self.deleted_refs.push((item.domain, ref_id));
                }
            }
        }
    }

    pub fn take_properties(&mut self) -> Vec<PropertyItem> {
        std::mem::take(&mut self.properties)
    }

    pub fn delete_properties(&mut self, items: Vec<PropertyItem>) {
        self.deleted_properties
            .extend(items.into_iter().filter_map(|p| p.id));
    }

    /// 是否存在待删除记录
    pub fn has_pending_deletes(&self) -> bool {
        !self.deleted_lists.is_empty()
            || !self.deleted_refs.is_empty()
            || !self.deleted_properties.is_empty()
    }

    /// 保存完成后清空待删除缓冲
    pub fn clear_pending_deletes(&mut self) {
        self.deleted_lists.clear();
        self.deleted_refs.clear();
        self.deleted_properties.clear();
    }
}

fn in_scope(type_code: &str, list_types: Option<&[String]>) -> bool {
    list_types.map_or(true, |types| types.iter().any(|t| t == type_code))
}

// ==========================================
// ListItem - 关联（父实体 → 子实体）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: Option<i64>,
    pub domain: ListDomain,
    pub type_code: String,  // 关联类型（listtype）
    pub ref_id: Option<i64>, // 被引用实体 ID（新建独占实体在保存前为 None）
    pub position: u32,
    pub status: i32,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub config: BTreeMap<String, String>,

    pub ref_item: Option<RefItem>, // 独占/共享的被引用实体；纯链接类为 None
}

impl ListItem {
    pub fn new(domain: ListDomain, type_code: impl Into<String>) -> Self {
        Self {
            id: None,
            domain,
            type_code: type_code.into(),
            ref_id: None,
            position: 0,
            status: STATUS_ENABLED,
            date_start: None,
            date_end: None,
            config: BTreeMap::new(),
            ref_item: None,
        }
    }
}

// ==========================================
// RefItem - 被引用实体
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RefItem {
    Text(TextItem),
    Media(MediaItem),
    Price(PriceItem),
    Attribute(AttributeItem),
}

impl RefItem {
    pub fn id(&self) -> Option<i64> {
        match self {
            RefItem::Text(t) => t.id,
            RefItem::Media(m) => m.id,
            RefItem::Price(p) => p.id,
            RefItem::Attribute(a) => a.id,
        }
    }

    pub fn set_id(&mut self, id: i64) {
        match self {
            RefItem::Text(t) => t.id = Some(id),
            RefItem::Media(m) => m.id = Some(id),
            RefItem::Price(p) => p.id = Some(id),
            RefItem::Attribute(a) => a.id = Some(id),
        }
    }

    pub fn domain(&self) -> ListDomain {
        match self {
            RefItem::Text(_) => ListDomain::Text,
            RefItem::Media(_) => ListDomain::Media,
            RefItem::Price(_) => ListDomain::Price,
            RefItem::Attribute(_) => ListDomain::Attribute,
        }
    }

    pub fn type_code(&self) -> &str {
        match self {
            RefItem::Text(t) => &t.type_code,
            RefItem::Media(m) => &m.type_code,
            RefItem::Price(p) => &p.type_code,
            RefItem::Attribute(a) => &a.type_code,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RefItem::Text(t) => &t.label,
            RefItem::Media(m) => &m.label,
            RefItem::Price(p) => &p.label,
            RefItem::Attribute(a) => &a.label,
        }
    }

    pub fn status(&self) -> i32 {
        match self {
            RefItem::Text(t) => t.status,
            RefItem::Media(m) => m.status,
            RefItem::Price(p) => p.status,
            RefItem::Attribute(a) => a.status,
        }
    }

    /// 属性编码（仅共享属性实体有）
    pub fn code(&self) -> Option<&str> {
        match self {
            RefItem::Attribute(a) => Some(&a.code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub id: Option<i64>,
    pub type_code: String,
    pub language_id: Option<String>,
    pub content: String,
    pub label: String,
    pub status: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: Option<i64>,
    pub type_code: String,
    pub language_id: Option<String>,
    pub url: String,
    pub preview: String,
    pub mime_type: Option<String>,
    pub label: String,
    pub status: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
    pub id: Option<i64>,
    pub type_code: String,
    pub currency_id: String,
    pub quantity: u32,
    pub value: String,
    pub costs: String,
    pub rebate: String,
    pub tax_rate: String,
    pub label: String,
    pub status: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeItem {
    pub id: Option<i64>,
    pub type_code: String,
    pub code: String,
    pub label: String,
    pub status: i32,
}

// ==========================================
// PropertyItem - 父实体属性（非关联）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyItem {
    pub id: Option<i64>,
    pub type_code: String,
    pub language_id: Option<String>,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_list(id: i64, type_code: &str) -> ListItem {
        let mut li = ListItem::new(ListDomain::Text, type_code);
        li.id = Some(id);
        li.ref_id = Some(id * 10);
        li.ref_item = Some(RefItem::Text(TextItem {
            id: Some(id * 10),
            type_code: "name".to_string(),
            language_id: None,
            content: format!("content {}", id),
            label: String::new(),
            status: 1,
        }));
        li
    }

    #[test]
    fn test_take_list_items_respects_scope() {
        let mut item = Item::new(ParentDomain::Product, "P1");
        item.add_list_item(text_list(1, "default"));
        item.add_list_item(text_list(2, "hidden"));
        item.add_list_item(ListItem::new(ListDomain::Catalog, "default"));

        let scope = vec!["default".to_string()];
        let taken = item.take_list_items(ListDomain::Text, Some(&scope));

        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].id, Some(1));
        assert_eq!(item.lists.len(), 2);
    }

    #[test]
    fn test_delete_list_items_with_refs() {
        let mut item = Item::new(ParentDomain::Product, "P1");
        item.delete_list_items(vec![text_list(3, "default")], true);

        assert_eq!(item.deleted_lists, vec![3]);
        assert_eq!(item.deleted_refs, vec![(ListDomain::Text, 30)]);
        assert!(item.has_pending_deletes());

        item.clear_pending_deletes();
        assert!(!item.has_pending_deletes());
    }
}
