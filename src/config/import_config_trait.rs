// ==========================================
// 商品导入对账引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::FieldMapping;
use crate::importer::error::{ImportError, ImportResult};

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 作用域过滤（listtypes）、分隔符、已知编码、字段映射
// 实现者: ConfigManager（config_kv 表）, MapConfig（内存）
pub trait ImportConfigReader: Send + Sync {
    /// 读取原始配置值
    ///
    /// # 返回
    /// - Ok(Some(String)): 配置值
    /// - Ok(None): 未配置
    /// - Err: 读取失败
    fn get(&self, key: &str) -> ImportResult<Option<String>>;

    /// 读取配置值，未配置时返回默认值
    fn get_or(&self, key: &str, default: &str) -> ImportResult<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取列表配置
    ///
    /// # 格式
    /// - JSON 数组: ["default", "variant"]
    /// - 逗号分隔: default,variant
    ///
    /// # 返回
    /// - Ok(None): 未配置（与"配置为空列表"区分）
    fn get_list(&self, key: &str) -> ImportResult<Option<Vec<String>>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };

        let trimmed = raw.trim();
        if trimmed.starts_with('[') {
            let values: Vec<String> =
                serde_json::from_str(trimmed).map_err(|e| ImportError::ConfigValueError {
                    key: key.to_string(),
                    value: raw.clone(),
                    message: e.to_string(),
                })?;
            return Ok(Some(values));
        }

        Ok(Some(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    /// 读取非负整数配置
    fn get_usize(&self, key: &str, default: usize) -> ImportResult<usize> {
        match self.get(key)? {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| ImportError::ConfigValueError {
                    key: key.to_string(),
                    value: raw.clone(),
                    message: e.to_string(),
                }),
        }
    }

    /// 读取字段映射
    ///
    /// # 格式
    /// - JSON 对象，键为列位置: {"2": "text.type", "3": "text.content"}
    /// - 结果保持配置中的书写顺序（切块边界依此判定）
    fn get_mapping(&self, key: &str) -> ImportResult<Option<FieldMapping>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };

        let value_error = |message: String| ImportError::ConfigValueError {
            key: key.to_string(),
            value: raw.clone(),
            message,
        };

        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| value_error(e.to_string()))?;

        let mut mapping: FieldMapping = Vec::with_capacity(object.len());
        for (pos, field) in object {
            let pos = pos
                .trim()
                .parse::<usize>()
                .map_err(|_| value_error(format!("列位置必须为非负整数: {}", pos)))?;
            let field = field
                .as_str()
                .ok_or_else(|| value_error(format!("列 {} 的领域键必须为字符串", pos)))?;
            mapping.push((pos, field.to_string()));
        }
        Ok(Some(mapping))
    }
}
