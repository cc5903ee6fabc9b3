// ==========================================
// 文本关联
// ==========================================
// 自然键: content + language + type + listtype
// 被引用实体由关联独占
// ==========================================

use super::{opt, overwrite, overwrite_status};
use crate::domain::types::truncate_label;
use crate::domain::{Chunk, ListDomain, ListItem, NaturalKey, RefItem, TextItem, STATUS_ENABLED};
use crate::importer::error::ImportResult;
use crate::importer::list_reconciler::{ListKind, RefTypeSpec};

#[derive(Debug, Default)]
pub struct TextKind;

impl TextKind {
    pub fn new() -> Self {
        Self
    }
}

impl ListKind for TextKind {
    fn name(&self) -> &str {
        "text"
    }

    fn domain(&self) -> ListDomain {
        ListDomain::Text
    }

    fn required_key(&self) -> &'static str {
        "text.content"
    }

    fn ref_type(&self) -> Option<RefTypeSpec> {
        Some(RefTypeSpec {
            key: "text.type",
            default: "name",
            scope: "text/type",
        })
    }

    fn item_key(&self, item: &ListItem) -> Option<NaturalKey> {
        match item.ref_item.as_ref()? {
            RefItem::Text(text) => Some(NaturalKey::new([
                text.content.as_str(),
                text.language_id.as_deref().unwrap_or(""),
                text.type_code.as_str(),
                item.type_code.as_str(),
            ])),
            _ => None,
        }
    }

    fn chunk_key(
        &mut self,
        chunk: &Chunk,
        value: &str,
        list_type: &str,
        ref_type: &str,
    ) -> ImportResult<Option<NaturalKey>> {
        Ok(Some(NaturalKey::new([
            value,
            chunk.get_or("text.languageid", ""),
            ref_type,
            list_type,
        ])))
    }

    fn create(
        &mut self,
        chunk: &Chunk,
        value: &str,
        list_type: &str,
        ref_type: &str,
    ) -> ImportResult<ListItem> {
        let mut text = TextItem {
            id: None,
            type_code: ref_type.to_string(),
            language_id: opt(chunk, "text.languageid"),
            content: value.to_string(),
            label: truncate_label(value),
            status: STATUS_ENABLED,
        };
        if let Some(label) = chunk.get("text.label") {
            text.label = truncate_label(label);
        }
        overwrite_status(&mut text.status, chunk, "text.status")?;

        let mut list = ListItem::new(ListDomain::Text, list_type);
        list.ref_item = Some(RefItem::Text(text));
        Ok(list)
    }

    fn update(&mut self, item: &mut ListItem, chunk: &Chunk) -> ImportResult<()> {
        if let Some(RefItem::Text(text)) = item.ref_item.as_mut() {
            overwrite(&mut text.label, chunk, "text.label");
            text.label = truncate_label(&text.label);
            overwrite_status(&mut text.status, chunk, "text.status")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_key_matches_item_key() {
        let mut kind = TextKind::new();
        let chunk = Chunk::from_iter([("text.content", "Hello"), ("text.languageid", "en")]);

        let created = kind.create(&chunk, "Hello", "default", "name").unwrap();
        let key = kind.chunk_key(&chunk, "Hello", "default", "name").unwrap();

        assert_eq!(kind.item_key(&created), key);
    }

    #[test]
    fn test_label_defaults_to_truncated_content() {
        let mut kind = TextKind::new();
        let long = "x".repeat(300);
        let chunk = Chunk::from_iter([("text.content", long.as_str())]);

        let created = kind.create(&chunk, &long, "default", "name").unwrap();
        assert_eq!(created.ref_item.unwrap().label().chars().count(), 255);
    }

    #[test]
    fn test_update_overwrites_present_fields_only() {
        let mut kind = TextKind::new();
        let chunk = Chunk::from_iter([("text.content", "Hi"), ("text.label", "Greeting")]);
        let mut item = kind.create(&chunk, "Hi", "default", "name").unwrap();

        kind.update(&mut item, &Chunk::from_iter([("text.status", "0")]))
            .unwrap();

        let ref_item = item.ref_item.unwrap();
        assert_eq!(ref_item.label(), "Greeting");
        assert_eq!(ref_item.status(), 0);
    }
}
