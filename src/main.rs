#[tokio::main]
async fn main() -> anyhow::Result<()> {
    capsule_federation::server::run().await
}
