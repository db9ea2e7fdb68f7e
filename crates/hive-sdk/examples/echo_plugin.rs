//! Minimal plugin: connects to a local coordinator, logs every event it
//! receives, and heartbeats until interrupted.
//!
//! ```sh
//! cargo run -p hive-coord &
//! cargo run -p hive-sdk --example echo_plugin
//! ```

use std::sync::Arc;
use std::time::Duration;

use hive_sdk::{AgentConfig, PluginAgent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let mut config = AgentConfig::new("echo", "127.0.0.1:8080");
    config.version = "0.1.0".into();
    config.capabilities = vec!["echo".into()];
    config.event_handler = Some(Arc::new(|event| {
        println!("event: {} {}", event.event_type, event.data);
    }));

    let agent = PluginAgent::new(config);
    agent.start(Duration::from_secs(5)).await?;
    println!("connected as {}", agent.session_id().unwrap());

    tokio::signal::ctrl_c().await?;
    agent.stop().await;
    Ok(())
}
