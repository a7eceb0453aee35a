use firestore_forwarder::service::run_from_args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    run_from_args().await?;
    Ok(())
}
