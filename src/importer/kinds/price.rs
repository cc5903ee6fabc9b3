// ==========================================
// 价格关联
// ==========================================
// 自然键: currency + type + listtype
// 金额字段保留原始精度（字符串），仅校验可解析
// ==========================================

use super::overwrite_status;
use crate::domain::{Chunk, ListDomain, ListItem, NaturalKey, PriceItem, RefItem, STATUS_ENABLED};
use crate::domain::types::truncate_label;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::list_reconciler::{ListKind, RefTypeSpec};

pub const DEFAULT_CURRENCY: &str = "EUR";

#[derive(Debug, Default)]
pub struct PriceKind;

impl PriceKind {
    pub fn new() -> Self {
        Self
    }
}

/// 读取金额字段，块中缺失返回 None
fn decimal(chunk: &Chunk, key: &str) -> ImportResult<Option<String>> {
    match chunk.get(key) {
        None => Ok(None),
        Some(raw) => {
            let normalized = raw.replace(',', ".");
            match normalized.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Some(normalized)),
                _ => Err(ImportError::InvalidValue {
                    field: key.to_string(),
                    message: format!("不是有效金额: {}", raw),
                }),
            }
        }
    }
}

fn fill(price: &mut PriceItem, chunk: &Chunk) -> ImportResult<()> {
    if let Some(value) = decimal(chunk, "price.value")? {
        price.value = value;
    }
    if let Some(costs) = decimal(chunk, "price.costs")? {
        price.costs = costs;
    }
    if let Some(rebate) = decimal(chunk, "price.rebate")? {
        price.rebate = rebate;
    }
    if let Some(tax_rate) = decimal(chunk, "price.taxrate")? {
        price.tax_rate = tax_rate;
    }
    if let Some(quantity) = chunk.get("price.quantity") {
        price.quantity = quantity
            .parse::<u32>()
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| ImportError::InvalidValue {
                field: "price.quantity".to_string(),
                message: format!("数量必须为正整数: {}", quantity),
            })?;
    }
    if let Some(label) = chunk.get("price.label") {
        price.label = truncate_label(label);
    }
    overwrite_status(&mut price.status, chunk, "price.status")
}

impl ListKind for PriceKind {
    fn name(&self) -> &str {
        "price"
    }

    fn domain(&self) -> ListDomain {
        ListDomain::Price
    }

    fn required_key(&self) -> &'static str {
        "price.value"
    }

    fn ref_type(&self) -> Option<RefTypeSpec> {
        Some(RefTypeSpec {
            key: "price.type",
            default: "default",
            scope: "price/type",
        })
    }

    fn item_key(&self, item: &ListItem) -> Option<NaturalKey> {
        match item.ref_item.as_ref()? {
            RefItem::Price(price) => Some(NaturalKey::new([
                price.currency_id.as_str(),
                price.type_code.as_str(),
                item.type_code.as_str(),
            ])),
            _ => None,
        }
    }

    fn chunk_key(
        &mut self,
        chunk: &Chunk,
        _value: &str,
        list_type: &str,
        ref_type: &str,
    ) -> ImportResult<Option<NaturalKey>> {
        Ok(Some(NaturalKey::new([
            chunk.get_or("price.currencyid", DEFAULT_CURRENCY),
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
        let currency = chunk.get_or("price.currencyid", DEFAULT_CURRENCY);
        let mut price = PriceItem {
            id: None,
            type_code: ref_type.to_string(),
            currency_id: currency.to_string(),
            quantity: 1,
            value: value.to_string(),
            costs: "0.00".to_string(),
            rebate: "0.00".to_string(),
            tax_rate: "0.00".to_string(),
            label: truncate_label(&format!("{} {}", value, currency)),
            status: STATUS_ENABLED,
        };
        fill(&mut price, chunk)?;

        let mut list = ListItem::new(ListDomain::Price, list_type);
        list.ref_item = Some(RefItem::Price(price));
        Ok(list)
    }

    fn update(&mut self, item: &mut ListItem, chunk: &Chunk) -> ImportResult<()> {
        if let Some(RefItem::Price(price)) = item.ref_item.as_mut() {
            fill(price, chunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_value() {
        let mut kind = PriceKind::new();
        let a = Chunk::from_iter([("price.value", "10.00")]);
        let b = Chunk::from_iter([("price.value", "12.50"), ("price.currencyid", "EUR")]);

        assert_eq!(
            kind.chunk_key(&a, "10.00", "default", "default").unwrap(),
            kind.chunk_key(&b, "12.50", "default", "default").unwrap()
        );
    }

    #[test]
    fn test_update_changes_value() {
        let mut kind = PriceKind::new();
        let chunk = Chunk::from_iter([("price.value", "10.00"), ("price.quantity", "5")]);
        let mut list = kind.create(&chunk, "10.00", "default", "default").unwrap();

        kind.update(&mut list, &Chunk::from_iter([("price.value", "9,99")]))
            .unwrap();

        match list.ref_item.unwrap() {
            RefItem::Price(price) => {
                assert_eq!(price.value, "9.99");
                assert_eq!(price.quantity, 5);
                assert_eq!(price.currency_id, "EUR");
            }
            other => panic!("unexpected ref item {:?}", other),
        }
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let mut kind = PriceKind::new();
        for raw in ["abc", "NaN", "inf", "-infinity", "1e400"] {
            let chunk = Chunk::from_iter([("price.value", raw)]);
            let err = kind.create(&chunk, raw, "default", "default").unwrap_err();
            assert!(matches!(err, ImportError::InvalidValue { .. }), "{} 应被拒绝", raw);
        }
    }
}
