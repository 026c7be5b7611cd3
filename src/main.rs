#[tokio::main]
async fn main() -> std::io::Result<()> {
    resistance_server::run_with_config().await
}
