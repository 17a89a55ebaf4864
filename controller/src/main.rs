mod actuator;
mod cn105;
mod display;
mod event_loop;
mod host;
mod indicator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
