use play_analytics::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await
}
