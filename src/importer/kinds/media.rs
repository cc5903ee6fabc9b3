// ==========================================
// 媒体关联
// ==========================================
// 自然键: url + type + listtype
// 多值: 一个单元格内多个 URL 各自成为独立关联
// 本地文件缺失时跳过该值（MissingReferenceWarning）
// ==========================================

use super::{opt, overwrite, overwrite_opt, overwrite_status};
use crate::domain::types::truncate_label;
use crate::domain::{Chunk, ListDomain, ListItem, MediaItem, NaturalKey, RefItem, STATUS_ENABLED};
use crate::importer::error::ImportResult;
use crate::importer::list_reconciler::{ListKind, RefTypeSpec};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Default)]
pub struct MediaKind {
    root: Option<PathBuf>, // 本地媒体根目录；None 时不检查文件
}

impl MediaKind {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// 远程地址与内联数据总是视为存在
    fn exists(&self, url: &str) -> bool {
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("data:") {
            return true;
        }
        match &self.root {
            Some(root) => root.join(url.trim_start_matches('/')).is_file(),
            None => true,
        }
    }
}

/// 按扩展名推断 MIME 类型
fn guess_mime_type(url: &str) -> Option<String> {
    let ext = Path::new(url.split(['?', '#']).next().unwrap_or(url))
        .extension()?
        .to_str()?
        .to_lowercase();

    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime.to_string())
}

impl ListKind for MediaKind {
    fn name(&self) -> &str {
        "media"
    }

    fn domain(&self) -> ListDomain {
        ListDomain::Media
    }

    fn required_key(&self) -> &'static str {
        "media.url"
    }

    fn multi_value(&self) -> bool {
        true
    }

    fn ref_type(&self) -> Option<RefTypeSpec> {
        Some(RefTypeSpec {
            key: "media.type",
            default: "default",
            scope: "media/type",
        })
    }

    fn item_key(&self, item: &ListItem) -> Option<NaturalKey> {
        match item.ref_item.as_ref()? {
            RefItem::Media(media) => Some(NaturalKey::new([
                media.url.as_str(),
                media.type_code.as_str(),
                item.type_code.as_str(),
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
        if !self.exists(value) {
            warn!(url = %value, "媒体文件不存在");
            return Ok(None);
        }
        Ok(Some(NaturalKey::new([value, ref_type, list_type])))
    }

    fn create(
        &mut self,
        chunk: &Chunk,
        value: &str,
        list_type: &str,
        ref_type: &str,
    ) -> ImportResult<ListItem> {
        let mut media = MediaItem {
            id: None,
            type_code: ref_type.to_string(),
            language_id: opt(chunk, "media.languageid"),
            url: value.to_string(),
            preview: value.to_string(),
            mime_type: guess_mime_type(value),
            label: truncate_label(value),
            status: STATUS_ENABLED,
        };
        self.fill(&mut media, chunk)?;

        let mut list = ListItem::new(ListDomain::Media, list_type);
        list.ref_item = Some(RefItem::Media(media));
        Ok(list)
    }

    fn update(&mut self, item: &mut ListItem, chunk: &Chunk) -> ImportResult<()> {
        if let Some(RefItem::Media(media)) = item.ref_item.as_mut() {
            self.fill(media, chunk)?;
        }
        Ok(())
    }
}

impl MediaKind {
    fn fill(&self, media: &mut MediaItem, chunk: &Chunk) -> ImportResult<()> {
        overwrite_opt(&mut media.language_id, chunk, "media.languageid");
        overwrite(&mut media.preview, chunk, "media.preview");
        overwrite_opt(&mut media.mime_type, chunk, "media.mimetype");
        if let Some(label) = chunk.get("media.label") {
            media.label = truncate_label(label);
        }
        overwrite_status(&mut media.status, chunk, "media.status")
    }
}
