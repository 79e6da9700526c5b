use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use migratools_lib::{artifacts, config::MigrateConfig, db, logging, remote::create_remote, Migrator};

/// migratools 命令行入口
#[derive(Parser)]
#[clap(
    name = "migratools",
    version,
    about = "可断点续传的 WebDAV 目录树迁移工具"
)]
struct Cli {
    /// 配置文件路径
    #[clap(long, default_value = "config.json")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 阶段一：构建/刷新源端树索引
    Index,
    /// 阶段二：按索引把文件搬到目标端
    Transfer,
    /// 阶段三：回填目标端原生标识
    Reconcile,
    /// 根据节点库生成重定向表和时间戳修复脚本
    Artifacts,
    /// 顺序执行全部阶段并生成产物
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MigrateConfig::load(&cli.config)?;
    std::fs::create_dir_all(&config.local_tmp_dir)?;

    logging::init(Path::new(&config.local_tmp_dir), &config.log);

    let pool = db::connect(&config.db_path()).await?;
    let source = create_remote(&config.source)?;
    let dest = create_remote(&config.dest)?;

    let mut migrator = Migrator::new(
        pool,
        source,
        dest,
        config.source_prefix(),
        config.dest_prefix(),
        config.staging_dir(),
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Index => {
            let outcome = migrator.build_index().await?;
            info!(
                "索引完成: {} 个节点, {} 个有变化",
                outcome.nodes_visited, outcome.nodes_modified
            );
        }
        Commands::Transfer => {
            let outcome = migrator.move_files().await?;
            info!(
                "传输完成: {} 个文件, {} 字节",
                outcome.files_uploaded, outcome.bytes_transferred
            );
        }
        Commands::Reconcile => {
            let outcome = migrator.fetch_new_file_ids().await?;
            info!("标识回填完成: {} 个", outcome.ids_bound);
        }
        Commands::Artifacts => {
            artifacts::generate_nginx_redirect_config(migrator.store(), &config).await?;
            artifacts::generate_dir_timestamp_script(migrator.store(), &config).await?;
        }
        Commands::Run => {
            let report = migrator.run().await?;
            // 产物依赖 WebDAV 专属配置，缺了不影响迁移本身
            if let Err(e) = artifacts::generate_nginx_redirect_config(migrator.store(), &config).await {
                tracing::warn!("跳过重定向表生成: {}", e);
            }
            if let Err(e) = artifacts::generate_dir_timestamp_script(migrator.store(), &config).await {
                tracing::warn!("跳过时间戳脚本生成: {}", e);
            }
            info!(
                "全部完成: 上传 {} 个文件 / {} 个目录, 耗时 {} 秒",
                report.files_uploaded, report.dirs_uploaded, report.duration
            );
        }
    }

    Ok(())
}
