//! helpdesk-rag CLI 진입점

use anyhow::Result;
use clap::Parser;

use helpdesk_rag::cli::{self, Cli};
use helpdesk_rag::config::Settings;
use helpdesk_rag::logging;

fn main() -> Result<()> {
    // .env는 있으면 로드
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_env(cli.mode)?;

    // 로깅 초기화
    logging::init(settings.log_dir.as_deref());

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cli::run(cli, settings))
}
