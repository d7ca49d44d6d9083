mod dispatcher;
pub mod session;

use std::time::Duration;

use anyhow::Result;
use futures::{Stream, StreamExt as _};
use tokio::{
    select,
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};

use dispatcher::dispatch;
use session::{Key, Message, Session};

/// Drive `session` until the user quits or the key stream ends.
///
/// `render` is called with the current session after every applied message.
pub async fn event_loop<K, R>(
    mut session: Session,
    mut keys: K,
    refresh_interval: Duration,
    mut render: R,
) -> Result<Session>
where
    K: Stream<Item = Key> + Unpin,
    R: FnMut(&Session) -> Result<()>,
{
    let (sender, mut receiver) = mpsc::unbounded_channel();

    let mut refresh_timer = interval_at(Instant::now() + refresh_interval, refresh_interval);
    refresh_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut effects = session.start();
    loop {
        for effect in effects {
            if dispatch(effect, &sender).is_break() {
                // In-flight calls are left to their own timeouts
                return Ok(session);
            }
        }
        render(&session)?;

        let message = select! {
            key = keys.next() => {
                let Some(key) = key else {
                    tracing::info!("Input stream closed");
                    return Ok(session);
                };
                Message::Key(key)
            }
            Some(message) = receiver.recv() => message,
            _ = refresh_timer.tick() => Message::Tick,
        };
        tracing::trace!(?message, "Event received");
        effects = session.update(message);
    }
}
