use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use student_admin::app::auth::SessionGuard;
use student_admin::app::student::StudentService;
use student_admin::infrastructure::config::load_config;
use student_admin::infrastructure::identity::{build_identity, IdentityClient};
use student_admin::infrastructure::logger::Logger;
use student_admin::infrastructure::store::build_store;
use student_admin::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Arc::new(load_config().context("加载配置失败")?);
    let _log_guard = Logger::init(&config.logging)?;

    info!("🚀 启动学生信息管理后台，后端: {:?}", config.backend.kind);

    let students = StudentService::new(build_store(&config));
    let identity = Arc::new(IdentityClient::new(build_identity(&config)));
    let sessions = Arc::new(SessionGuard::new(
        identity,
        config.session.store_path.clone(),
    ));

    // 订阅失败不致命：先做一次全量读取，页面仍可用，只是不会自动刷新
    let sync = match students.activate().await {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("建立变更订阅失败: {}", e);
            if let Err(e) = students.sync_now().await {
                warn!("首次读取失败: {}", e);
            }
            None
        }
    };

    let init_guard = Arc::clone(&sessions);
    tokio::spawn(async move { init_guard.init().await });

    let addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let app = build_router(AppState::new(students, sessions, Arc::clone(&config)));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法绑定到 {}", addr))?;
    info!("📖 服务器运行在 http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sync {
        handle.release();
        info!("已释放变更订阅");
    }
    info!("服务器已关闭");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // 无法监听信号时不主动退出
        error!("监听 Ctrl-C 失败: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到关闭信号，正在停止服务器...");
}
