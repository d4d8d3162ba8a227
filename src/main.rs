#[tokio::main]
async fn main() {
    if let Err(e) = carewatch_lib::run().await {
        tracing::error!("CareWatch failed: {e}");
        eprintln!("carewatch: {e}");
        std::process::exit(1);
    }
}
