use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;
use crate::services::command::context::{CommandHandler, Context, Execution};

/// Replies with how long the handler has been installed.
pub struct PingCommand {
    started: Instant,
}

impl PingCommand {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }
}

impl Default for PingCommand {
    fn default() -> Self {
        Self::new()
    }
}

fn format_uptime(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.push(format!("{}s", seconds));
    parts.join(" ")
}

#[async_trait]
impl CommandHandler for PingCommand {
    async fn execute(&self, ctx: &mut Context, _args: &[String]) -> anyhow::Result<Execution> {
        let uptime = format_uptime(self.started.elapsed().as_secs());
        debug!("ping from {} on {}", ctx.user.name, ctx.platform_kind());
        Ok(Execution::reply(format!("Pong! Uptime: {}", uptime)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(3661), "1h 1m 1s");
        assert_eq!(format_uptime(90_000), "1d 1h 0s");
    }
}
