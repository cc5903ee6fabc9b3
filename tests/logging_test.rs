// ==========================================
// 日志系统初始化测试
// ==========================================
// 独立测试二进制: init() 在进程内只能调用一次
// ==========================================

use item_import::logging;

#[test]
fn test_init_installs_global_subscriber() {
    assert!(!tracing::dispatcher::has_been_set());

    logging::init();

    assert!(tracing::dispatcher::has_been_set());
    tracing::info!("日志系统已初始化");
}
