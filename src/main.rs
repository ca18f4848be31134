/*
 * Responsibility
 * - tokio runtime start
 * - app::run() の呼び出し（ロジックは置かない）
 */
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    open_finance_gateway::app::run().await
}
