// ==========================================
// 关联对账集成测试
// ==========================================
// 测试目标: 幂等、原地更新、孤儿删除、作用域隔离、校验失败、切块边界、多值展开、排序
// ==========================================


use item_import::config::MapConfig;
use item_import::domain::{Item, ListDomain, ListItem, ParentDomain, RefItem, TextItem};
use item_import::logging;
use item_import::repository::{ItemRepository, TypeRepository};
use test_helpers::{count_rows, create_test_repo, list_count, load, product_config, row, run, texts};

const FULL_ROW: [&str; 9] = [
    "P1",
    "Shoe",
    "name",
    "Running shoe",
    "short",
    "Fast",
    "a.jpg\nb.jpg",
    "EUR",
    "10.00",
];

#[test]
fn test_import_creates_all_associations() {
    logging::init_test();
    let (_tmp, repo) = create_test_repo();

    let report = run(&repo, ParentDomain::Product, product_config(), vec![row(&FULL_ROW)]).unwrap();

    assert_eq!(report.created_items, 1);
    let item = load(&repo, ParentDomain::Product, "P1").unwrap();
    assert_eq!(item.label, "Shoe");
    assert_eq!(list_count(&item, ListDomain::Text), 2);
    assert_eq!(list_count(&item, ListDomain::Media), 2);
    assert_eq!(list_count(&item, ListDomain::Price), 1);
}

#[test]
fn test_reimport_is_idempotent() {
    let (_tmp, repo) = create_test_repo();

    run(&repo, ParentDomain::Product, product_config(), vec![row(&FULL_ROW)]).unwrap();
    let first = load(&repo, ParentDomain::Product, "P1").unwrap();
    let lists_before = count_rows(&repo, "item_list");
    let refs_before = count_rows(&repo, "ref_item");
    let types_before = count_rows(&repo, "type_item");

    let report = run(&repo, ParentDomain::Product, product_config(), vec![row(&FULL_ROW)]).unwrap();
    let second = load(&repo, ParentDomain::Product, "P1").unwrap();

    assert_eq!(report.updated_items, 1);
    assert_eq!(report.types.created, 0, "第二次导入不应新建类型编码");
    assert_eq!(count_rows(&repo, "item_list"), lists_before);
    assert_eq!(count_rows(&repo, "ref_item"), refs_before);
    assert_eq!(count_rows(&repo, "type_item"), types_before);
    assert_eq!(texts(&first), texts(&second), "关联 ID 与位置应保持不变");
    assert_eq!(report.lists["text"].created, 0);
    assert_eq!(report.lists["text"].updated, 2);
}

#[test]
fn test_update_in_place_keeps_identity() {
    let (_tmp, repo) = create_test_repo();
    run(&repo, ParentDomain::Product, product_config(), vec![row(&FULL_ROW)]).unwrap();
    let before = load(&repo, ParentDomain::Product, "P1").unwrap();
    let price_id = before.list_items(ListDomain::Price, None).next().unwrap().id;

    let mut changed = FULL_ROW;
    changed[8] = "12.50";
    run(&repo, ParentDomain::Product, product_config(), vec![row(&changed)]).unwrap();

    let after = load(&repo, ParentDomain::Product, "P1").unwrap();
    let price = after.list_items(ListDomain::Price, None).next().unwrap();
    assert_eq!(price.id, price_id, "自然键未变时应复用原关联");
    match price.ref_item.as_ref().unwrap() {
        RefItem::Price(p) => assert_eq!(p.value, "12.50"),
        other => panic!("unexpected ref item {:?}", other),
    }
}

#[test]
fn test_orphans_are_deleted_with_owned_refs() {
    let (_tmp, repo) = create_test_repo();
    run(&repo, ParentDomain::Product, product_config(), vec![row(&FULL_ROW)]).unwrap();
    let refs_before = count_rows(&repo, "ref_item");

    let mut reduced = FULL_ROW;
    reduced[4] = "";
    reduced[5] = "";
    reduced[6] = "a.jpg";
    let report = run(&repo, ParentDomain::Product, product_config(), vec![row(&reduced)]).unwrap();

    let item = load(&repo, ParentDomain::Product, "P1").unwrap();
    let remaining = texts(&item);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].2, "Running shoe");
    assert_eq!(list_count(&item, ListDomain::Media), 1);
    assert_eq!(report.lists["text"].deleted, 1);
    assert_eq!(report.lists["media"].deleted, 1);
    assert_eq!(count_rows(&repo, "ref_item"), refs_before - 2, "独占实体应随关联删除");
}

#[test]
fn test_scope_filter_leaves_other_list_types_untouched() {
    let (_tmp, repo) = create_test_repo();

    // 预置一个作用域外的文本关联
    let mut item = Item::new(ParentDomain::Product, "P1");
    let mut hidden = ListItem::new(ListDomain::Text, "hidden");
    hidden.ref_item = Some(RefItem::Text(TextItem {
        id: None,
        type_code: "name".to_string(),
        language_id: None,
        content: "Internal note".to_string(),
        label: "Internal note".to_string(),
        status: 1,
    }));
    item.add_list_item(hidden);
    repo.save_item(&mut item).unwrap();

    let config = product_config().with("import/processor/text/listtypes", "default");
    run(&repo, ParentDomain::Product, config.clone(), vec![row(&FULL_ROW)]).unwrap();

    let mut reduced = FULL_ROW;
    reduced[4] = "";
    reduced[5] = "";
    run(&repo, ParentDomain::Product, config, vec![row(&reduced)]).unwrap();

    let item = load(&repo, ParentDomain::Product, "P1").unwrap();
    let hidden: Vec<_> = item
        .lists
        .iter()
        .filter(|li| li.domain == ListDomain::Text && li.type_code == "hidden")
        .collect();
    assert_eq!(hidden.len(), 1, "作用域外的关联不应被删除");
    assert_eq!(
        item.list_items(ListDomain::Text, Some(&["default".to_string()]))
            .count(),
        1
    );
}

#[test]
fn test_unknown_type_fails_fast_and_keeps_row_untouched() {
    let (_tmp, repo) = create_test_repo();

    let mut bad = FULL_ROW;
    bad[0] = "P2";
    bad[2] = "bogus";
    let err = run(
        &repo,
        ParentDomain::Product,
        product_config(),
        vec![row(&FULL_ROW), row(&bad)],
    )
    .unwrap_err();

    assert!(err.is_validation(), "unexpected error: {}", err);
    assert!(load(&repo, ParentDomain::Product, "P1").is_some());
    assert!(load(&repo, ParentDomain::Product, "P2").is_none(), "失败行不应保存");

    // 中止前已刷新类型注册表
    let codes = repo
        .search_type_codes("product/lists/type", &["text".to_string()])
        .unwrap();
    assert_eq!(codes, vec![("text".to_string(), "default".to_string())]);
    let bogus = repo
        .search_type_codes("text/type", &["product".to_string()])
        .unwrap();
    assert!(!bogus.iter().any(|(_, code)| code == "bogus"));
}

#[test]
fn test_explicit_list_type_must_be_known() {
    let (_tmp, repo) = create_test_repo();
    let config = product_config()
        .with(
            "import/mapping/price",
            r#"{"7": "price.currencyid", "8": "price.value", "9": "product.lists.type"}"#,
        );

    let mut values: Vec<&str> = FULL_ROW.to_vec();
    values.push("promo");
    let err = run(&repo, ParentDomain::Product, config, vec![row(&values)]).unwrap_err();

    assert!(err.is_validation());
}

#[test]
fn test_chunk_boundaries_and_blank_chunks() {
    let (_tmp, repo) = create_test_repo();

    let mut one_text = FULL_ROW;
    one_text[2] = "";
    one_text[3] = "";
    run(&repo, ParentDomain::Product, product_config(), vec![row(&one_text)]).unwrap();

    let item = load(&repo, ParentDomain::Product, "P1").unwrap();
    let texts = texts(&item);
    assert_eq!(texts.len(), 1, "空白的子记录应被跳过");
    assert_eq!(texts[0].1, "short");
    assert_eq!(texts[0].2, "Fast");
    assert_eq!(texts[0].3, 0);
}

#[test]
fn test_multi_value_expansion_positions() {
    let (_tmp, repo) = create_test_repo();
    let mut values = FULL_ROW;
    values[6] = "a.jpg\n\n b.jpg \nc.jpg";
    run(&repo, ParentDomain::Product, product_config(), vec![row(&values)]).unwrap();

    let item = load(&repo, ParentDomain::Product, "P1").unwrap();
    let mut media: Vec<(String, u32)> = item
        .list_items(ListDomain::Media, None)
        .filter_map(|li| match li.ref_item.as_ref()? {
            RefItem::Media(m) => Some((m.url.clone(), li.position)),
            _ => None,
        })
        .collect();
    media.sort_by_key(|m| m.1);

    assert_eq!(
        media,
        vec![
            ("a.jpg".to_string(), 0),
            ("b.jpg".to_string(), 1),
            ("c.jpg".to_string(), 2)
        ]
    );
}

#[test]
fn test_reordering_updates_positions_not_identity() {
    let (_tmp, repo) = create_test_repo();
    run(&repo, ParentDomain::Product, product_config(), vec![row(&FULL_ROW)]).unwrap();
    let before = texts(&load(&repo, ParentDomain::Product, "P1").unwrap());

    let swapped = [
        "P1", "Shoe", "short", "Fast", "name", "Running shoe", "a.jpg\nb.jpg", "EUR", "10.00",
    ];
    run(&repo, ParentDomain::Product, product_config(), vec![row(&swapped)]).unwrap();
    let after = texts(&load(&repo, ParentDomain::Product, "P1").unwrap());

    assert_eq!(after[0].2, "Fast");
    assert_eq!(after[1].2, "Running shoe");
    assert_eq!(after[0].0, before[1].0, "关联 ID 应保持不变");
    assert_eq!(after[1].0, before[0].0);
}

#[test]
fn test_duplicate_natural_key_merges_into_one_association() {
    let (_tmp, repo) = create_test_repo();
    let mut values = FULL_ROW;
    values[4] = "name";
    values[5] = "Running shoe";
    run(&repo, ParentDomain::Product, product_config(), vec![row(&values)]).unwrap();

    let item = load(&repo, ParentDomain::Product, "P1").unwrap();
    assert_eq!(texts(&item).len(), 1);
}

#[test]
fn test_explicit_default_codes_accepted_on_fresh_database() {
    let (_tmp, repo) = create_test_repo();
    let config = MapConfig::new()
        .with("import/skip-lines", "0")
        .with("import/processors", "text,price")
        .with("import/mapping/item", r#"{"0": "product.code"}"#)
        .with(
            "import/mapping/text",
            r#"{"1": "product.lists.type", "2": "text.type", "3": "text.content"}"#,
        )
        .with(
            "import/mapping/price",
            r#"{"4": "price.value", "5": "price.type"}"#,
        );

    let report = run(
        &repo,
        ParentDomain::Product,
        config,
        vec![row(&["P1", "default", "name", "Hello", "1.00", "default"])],
    )
    .unwrap();

    assert_eq!(report.processed_rows, 1);
    let item = load(&repo, ParentDomain::Product, "P1").unwrap();
    let texts = texts(&item);
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].1, "name");
    assert_eq!(list_count(&item, ListDomain::Price), 1);

    // 显式给出的默认编码同样补建
    let codes = repo
        .search_type_codes("text/type", &["product".to_string()])
        .unwrap();
    assert_eq!(codes, vec![("product".to_string(), "name".to_string())]);
}

#[test]
fn test_explicit_default_list_type_still_scope_filtered() {
    let (_tmp, repo) = create_test_repo();
    let config = product_config()
        .with("import/processor/price/listtypes", "promo")
        .with(
            "import/mapping/price",
            r#"{"7": "price.currencyid", "8": "price.value", "9": "product.lists.type"}"#,
        );

    let mut values: Vec<&str> = FULL_ROW.to_vec();
    values.push("default");
    let report = run(&repo, ParentDomain::Product, config, vec![row(&values)]).unwrap();

    let item = load(&repo, ParentDomain::Product, "P1").unwrap();
    assert_eq!(list_count(&item, ListDomain::Price), 0);
    assert_eq!(report.lists["price"].skipped, 1);
}
