//! ember node binary.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    ember_node_commands::run().await
}
