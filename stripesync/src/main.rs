#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stripesync::run_cli().await
}
