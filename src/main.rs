#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    textswift::run_host().await
}
