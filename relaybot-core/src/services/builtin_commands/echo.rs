use async_trait::async_trait;
use crate::services::command::context::{CommandHandler, Context, CooldownOverride, Execution};

/// Repeats its arguments. With nothing to repeat, fails without a cooldown.
pub struct EchoCommand;

#[async_trait]
impl CommandHandler for EchoCommand {
    async fn execute(&self, _ctx: &mut Context, args: &[String]) -> anyhow::Result<Execution> {
        if args.is_empty() {
            return Ok(Execution {
                cooldown: CooldownOverride::Disabled,
                ..Execution::failure("Nothing to echo!")
            });
        }

        Ok(Execution {
            has_external_input: true,
            ..Execution::reply(args.join(" "))
        })
    }
}
