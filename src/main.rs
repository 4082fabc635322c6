#[tokio::main]
async fn main() -> anyhow::Result<()> {
    qrscan_lib::run().await
}
