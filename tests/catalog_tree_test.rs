// ==========================================
// 目录树导入集成测试
// ==========================================
// 测试目标: 逐节点对账、父节点解析（含同批次新建节点）、重复导入幂等
// ==========================================


use item_import::config::MapConfig;
use item_import::domain::{ListDomain, ParentDomain};
use test_helpers::{count_rows, create_test_repo, list_count, load, row, run, texts};

fn catalog_config() -> MapConfig {
    MapConfig::new()
        .with("import/skip-lines", "0")
        .with("import/max-size", "2")
        .with("import/processors", "text")
        .with(
            "import/mapping/item",
            r#"{"0": "catalog.code", "1": "catalog.label", "2": "catalog.parent"}"#,
        )
        .with("import/mapping/text", r#"{"3": "text.content"}"#)
}

fn tree_rows() -> Vec<item_import::domain::RawRow> {
    vec![
        row(&["root", "Root", "", "Welcome"]),
        row(&["shoes", "Shoes", "root", "All shoes"]),
        row(&["boots", "Boots", "shoes", "Winter boots"]),
        row(&["orphan", "Orphan", "nowhere", "Lost"]),
    ]
}

#[test]
fn test_tree_nodes_resolve_parents() {
    let (_tmp, repo) = create_test_repo();

    let report = run(&repo, ParentDomain::Catalog, catalog_config(), tree_rows()).unwrap();
    assert_eq!(report.created_items, 4);

    let root = load(&repo, ParentDomain::Catalog, "root").unwrap();
    let shoes = load(&repo, ParentDomain::Catalog, "shoes").unwrap();
    let boots = load(&repo, ParentDomain::Catalog, "boots").unwrap();
    let orphan = load(&repo, ParentDomain::Catalog, "orphan").unwrap();

    assert_eq!(root.parent_id, None);
    assert_eq!(shoes.parent_id, root.id);
    assert_eq!(boots.parent_id, shoes.id, "跨批次的父节点也应解析");
    assert_eq!(orphan.parent_id, None, "父节点不存在时保持为空");
    assert_eq!(list_count(&boots, ListDomain::Text), 1);
    assert_eq!(texts(&shoes)[0].2, "All shoes");
}

#[test]
fn test_tree_reimport_is_idempotent() {
    let (_tmp, repo) = create_test_repo();
    run(&repo, ParentDomain::Catalog, catalog_config(), tree_rows()).unwrap();
    let lists = count_rows(&repo, "item_list");

    let report = run(&repo, ParentDomain::Catalog, catalog_config(), tree_rows()).unwrap();

    assert_eq!(report.created_items, 0);
    assert_eq!(report.updated_items, 4);
    assert_eq!(count_rows(&repo, "item"), 4);
    assert_eq!(count_rows(&repo, "item_list"), lists);
}

#[test]
fn test_node_cannot_be_its_own_parent() {
    let (_tmp, repo) = create_test_repo();

    let report = run(
        &repo,
        ParentDomain::Catalog,
        catalog_config(),
        vec![row(&["loop", "Loop", "loop", "Self"])],
    )
    .unwrap();

    assert_eq!(report.failed_rows, 1);
    assert!(load(&repo, ParentDomain::Catalog, "loop").is_none());
}
