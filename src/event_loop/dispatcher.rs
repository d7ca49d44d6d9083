use std::{future::Future, ops::ControlFlow};

use tokio::{spawn, sync::mpsc, time::sleep};

use super::session::{Effect, Message};
use crate::client::Command;

/// Start the work an effect asks for.
///
/// Each network call runs on its own task and posts exactly one message back;
/// nothing here touches the session. Returns [`ControlFlow::Break`] on quit.
pub fn dispatch(effect: Effect, sender: &mpsc::UnboundedSender<Message>) -> ControlFlow<()> {
    match effect {
        Effect::Probe { seq, client } => report(sender, async move {
            Message::Probed {
                seq,
                result: client.probe().await,
            }
        }),
        Effect::Command { command, client } => report(sender, async move {
            tracing::debug!(?command, "Sending command");
            let result = match command {
                Command::Play => client.play().await,
                Command::Pause => client.pause().await,
                Command::Stop => client.stop().await,
                Command::Toggle => client.toggle().await,
                Command::SetVolume(volume) => client.set_volume(volume.into()).await,
            };
            Message::CommandFinished { command, result }
        }),
        Effect::Refresh { seq, client } => report(sender, async move {
            Message::Refreshed {
                seq,
                result: client.get_state().await,
            }
        }),
        Effect::RefreshAfter(delay) => report(sender, async move {
            sleep(delay).await;
            Message::FollowUpRefresh
        }),
        Effect::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

fn report<F>(sender: &mpsc::UnboundedSender<Message>, operation: F)
where
    F: Future<Output = Message> + Send + 'static,
{
    let sender = sender.clone();
    spawn(async move {
        let message = operation.await;
        if sender.send(message).is_err() {
            tracing::debug!("Event loop gone, dropping result");
        }
    });
}
