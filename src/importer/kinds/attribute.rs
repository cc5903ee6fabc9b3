// ==========================================
// 属性关联
// ==========================================
// 自然键: listtype + 属性类型 + 属性编码
// 属性实体为共享主数据: 按 (type, code) 查找，缺失时新建，关联删除时保留
// ==========================================

use crate::domain::types::truncate_label;
use crate::domain::{AttributeItem, Chunk, ListDomain, ListItem, NaturalKey, RefItem, STATUS_ENABLED};
use crate::importer::error::ImportResult;
use crate::importer::list_reconciler::{ListKind, RefTypeSpec};
use crate::repository::RefRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct AttributeKind {
    repo: Arc<dyn RefRepository>,
    // (type, code) → 共享属性，批次内复用
    cache: HashMap<(String, String), AttributeItem>,
}

impl AttributeKind {
    pub fn new(repo: Arc<dyn RefRepository>) -> Self {
        Self {
            repo,
            cache: HashMap::new(),
        }
    }

    /// 查找或新建共享属性
    fn attribute(&mut self, chunk: &Chunk, type_code: &str, code: &str) -> ImportResult<AttributeItem> {
        let key = (type_code.to_string(), code.to_string());
        if let Some(found) = self.cache.get(&key) {
            return Ok(found.clone());
        }

        let attribute = match self.repo.find_attribute(type_code, code)? {
            Some(found) => found,
            None => {
                let mut created = AttributeItem {
                    id: None,
                    type_code: type_code.to_string(),
                    code: code.to_string(),
                    label: truncate_label(chunk.get_or("attribute.label", code)),
                    status: STATUS_ENABLED,
                };
                self.repo.save_attribute(&mut created)?;
                debug!(type_code = %type_code, code = %code, "共享属性已新建");
                created
            }
        };

        self.cache.insert(key, attribute.clone());
        Ok(attribute)
    }
}

impl ListKind for AttributeKind {
    fn name(&self) -> &str {
        "attribute"
    }

    fn domain(&self) -> ListDomain {
        ListDomain::Attribute
    }

    fn required_key(&self) -> &'static str {
        "attribute.code"
    }

    fn multi_value(&self) -> bool {
        true
    }

    fn ref_type(&self) -> Option<RefTypeSpec> {
        Some(RefTypeSpec {
            key: "attribute.type",
            default: "default",
            scope: "attribute/type",
        })
    }

    fn item_key(&self, item: &ListItem) -> Option<NaturalKey> {
        match item.ref_item.as_ref()? {
            RefItem::Attribute(attribute) => Some(NaturalKey::new([
                item.type_code.as_str(),
                attribute.type_code.as_str(),
                attribute.code.as_str(),
            ])),
            _ => None,
        }
    }

    fn chunk_key(
        &mut self,
        _chunk: &Chunk,
        value: &str,
        list_type: &str,
        ref_type: &str,
    ) -> ImportResult<Option<NaturalKey>> {
        Ok(Some(NaturalKey::new([list_type, ref_type, value])))
    }

    fn create(
        &mut self,
        chunk: &Chunk,
        value: &str,
        list_type: &str,
        ref_type: &str,
    ) -> ImportResult<ListItem> {
        let attribute = self.attribute(chunk, ref_type, value)?;

        let mut list = ListItem::new(ListDomain::Attribute, list_type);
        list.ref_id = attribute.id;
        list.ref_item = Some(RefItem::Attribute(attribute));
        Ok(list)
    }

    fn update(&mut self, item: &mut ListItem, chunk: &Chunk) -> ImportResult<()> {
        let Some(label) = chunk.get("attribute.label") else {
            return Ok(());
        };
        if let Some(RefItem::Attribute(attribute)) = item.ref_item.as_mut() {
            let label = truncate_label(label);
            if attribute.label != label {
                attribute.label = label;
                self.repo.save_attribute(attribute)?;
                self.cache.insert(
                    (attribute.type_code.clone(), attribute.code.clone()),
                    attribute.clone(),
                );
            }
        }
        Ok(())
    }
}
