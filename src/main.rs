//! mcp-relay 交互式客户端
//!
//! 入口：初始化日志、加载配置、连接 MCP 后端，然后逐行读取用户输入并流式打印回答。
//! 输入 quit 退出；Ctrl+C 在当前查询完成后退出。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use mcp_relay::config::load_config;
use mcp_relay::core::{ShutdownManager, ShutdownReason};
use mcp_relay::observability;
use mcp_relay::react::ReactEvent;
use mcp_relay::Agent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    // 可选参数：配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let mut agent = Agent::from_config(&cfg)
        .await
        .context("Failed to create agent")?;

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    println!("\nMCP Client Started!");
    println!("Tools: {}", agent.tool_names().join(", "));
    println!("Type your queries or 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interrupted = false;
    loop {
        print!("\nYou: ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            biased;
            _ = shutdown.wait_for_shutdown() => {
                interrupted = true;
                break;
            }
            line = lines.next_line() => line.context("Failed to read input")?,
        };
        let Some(line) = line else {
            shutdown.shutdown(ShutdownReason::InputClosed);
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            shutdown.shutdown(ShutdownReason::UserInitiated);
            break;
        }

        println!("\nAI: ");
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_events(event_rx));
        let result = agent.process_message(query, Some(&event_tx)).await;
        drop(event_tx);
        join_printer(printer).await;

        match result {
            Ok(Some(_)) => println!(),
            Ok(None) => println!("(no answer)"),
            Err(e) => println!("\nError: {e}"),
        }
    }

    tracing::debug!(reason = ?shutdown.reason(), "interactive loop finished");
    println!("AI: Bye! See you next time!");
    if interrupted {
        // 后台 stdin 读取仍阻塞在 read 上，等待 runtime 关闭会卡到下一次回车
        std::process::exit(0);
    }
    Ok(())
}

/// 等待输出任务结束；任务 panic 时记录日志，返回是否正常结束
async fn join_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("event printer task failed: {}", e);
            false
        }
    }
}

/// 流式文本直接输出；工具调用单独一行提示
async fn print_events(mut rx: mpsc::UnboundedReceiver<ReactEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            ReactEvent::MessageChunk { text } => {
                print!("{text}");
                stdout.flush().ok();
            }
            ReactEvent::ToolCall { tool, args } => {
                println!("\nMCP: [Calling tool {tool} with args {args}]");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_printer_reports_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_events(rx));
        drop(tx);
        assert!(join_printer(printer).await);

        let panicking = tokio::spawn(async { panic!("printer crashed") });
        assert!(!join_printer(panicking).await);
    }
}
