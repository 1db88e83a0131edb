//! Entry point for the cluster certificate controller binary.
#[tokio::main]
async fn main() -> certctl::error::Result<()> {
    certctl::cli::run().await
}
