//! Hive - 多智能体会话桥
//!
//! 入口：初始化日志、加载配置、创建运行时与单个会话，然后在标准输入上运行 REPL。
//! 命令：/history、/export [-z]、/import [-z] <blob>、/restart、/quit；其余输入作为用户消息发送。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hive::agents::KeywordCapability;
use hive::bridge::{Session, SessionRegistry};
use hive::config::load_config;
use hive::tools::{InMemoryRetriever, LightStore};
use hive::{create_runtime, observability};
use tokio::io::{AsyncBufReadExt, BufReader};

/// 内置示例文档，供 document_search 演示
fn sample_documents() -> InMemoryRetriever {
    let retriever = InMemoryRetriever::new();
    retriever.add_document(
        "home_manual.md",
        [
            "The porch light is on an outdoor circuit and can be scheduled from the hallway panel.",
            "The chandelier uses dimmable bulbs; replace them with 60W equivalents only.",
        ],
    );
    retriever.add_document(
        "travel_policy.md",
        [
            "Employees must book flights at least 14 days in advance.",
            "Hotel stays are reimbursed up to 150 per night with receipts.",
        ],
    );
    retriever
}

enum Command<'a> {
    History,
    Export { compress: bool },
    Import { compressed: bool, blob: &'a str },
    Restart,
    Quit,
    Say(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let mut parts = line.splitn(2, ' ');
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();
    match head {
        "/history" => Command::History,
        "/export" => Command::Export {
            compress: rest == "-z",
        },
        "/import" => match rest.strip_prefix("-z") {
            Some(blob) => Command::Import {
                compressed: true,
                blob: blob.trim(),
            },
            None => Command::Import {
                compressed: false,
                blob: rest,
            },
        },
        "/restart" => Command::Restart,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Say(line),
    }
}

/// 处理一行输入；返回 false 表示退出
async fn handle_line(session: &Session, line: &str) -> bool {
    match parse_command(line) {
        Command::History => {
            println!("{}", session.render_history().unwrap_or_else(|| "(no messages)".into()));
        }
        Command::Export { compress } => match session.export_state(compress) {
            Ok(blob) => println!("{blob}"),
            Err(e) => eprintln!("export failed: {e}"),
        },
        Command::Import { compressed, blob } => match session.import_state(blob, compressed) {
            Ok(()) => println!("imported {} messages", session.transcript().len()),
            Err(e) => eprintln!("import failed: {e}"),
        },
        Command::Restart => {
            session.restart();
            println!("session restarted");
        }
        Command::Quit => return false,
        Command::Say(text) => match session.send_with_recovery(text).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => eprintln!("error: {e}"),
        },
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志写到 stderr，默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let runtime = create_runtime(
        &cfg,
        Arc::new(KeywordCapability),
        Arc::new(sample_documents()),
        LightStore::default(),
    )
    .context("Failed to create agent runtime")?;

    let registry = SessionRegistry::new(Arc::new(runtime), cfg.bridge.clone());
    let session = registry.create().await;
    tracing::info!(session = %session.id(), "Ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !handle_line(&session, line).await {
            break;
        }
    }

    registry.shutdown().await;
    Ok(())
}
