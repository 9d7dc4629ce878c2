//! 可观测性：tracing 日志

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装 fmt 日志层；默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
