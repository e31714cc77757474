//! Telegram update dispatch.

use std::sync::Arc;

use futures::FutureExt;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use crate::inbound::InboundHandler;
use crate::platform::TelegramPlatform;
use crate::session::UpdateListener;

const USAGE: &str = "Send me a document, video or audio file and I will store it \
in the archive channel and reply with a download link.";

/// Build the listener that runs the update dispatcher on the session runtime.
pub fn update_listener(bot: Bot, handler: Arc<InboundHandler>) -> UpdateListener {
    Box::new(move |shutdown| {
        async move {
            let schema = Update::filter_message().endpoint(handle_message);

            let mut dispatcher = Dispatcher::builder(bot, schema)
                .dependencies(dptree::deps![handler])
                .default_handler(|_| async {})
                .build();

            let token = dispatcher.shutdown_token();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                if let Ok(stopped) = token.shutdown() {
                    stopped.await;
                }
            });

            tracing::info!("Receiving updates");
            dispatcher.dispatch().await;
            tracing::info!("Update dispatcher stopped");
        }
        .boxed()
    })
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    handler: Arc<InboundHandler>,
) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }

    if let Some(command) = msg.text().and_then(command_name) {
        if command == "start" || command == "help" {
            bot.send_message(msg.chat.id, USAGE).await?;
            return Ok(());
        }
    }

    let inbound = TelegramPlatform::inbound_message(&msg);
    let reply = handler.handle(&inbound).await;

    bot.send_message(msg.chat.id, reply.text())
        .reply_to_message_id(msg.id)
        .await?;

    Ok(())
}

/// `/cmd@botname args` -> `cmd`
fn command_name(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('/')?;
    let word = rest.split_whitespace().next()?;
    let name = word.split('@').next()?;
    (!name.is_empty()).then_some(name)
}
