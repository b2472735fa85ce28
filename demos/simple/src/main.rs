#[tokio::main]
async fn main() {
    steady_etag_demo::main().await
}
