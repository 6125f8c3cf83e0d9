//! Rotating presence ("Watching a spider on the wall!").
//!
//! A timer task picks a random activity every interval and hands it over an
//! mpsc channel to the task that owns the gateway context and applies it.
//! The two never share state directly.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serenity::all::ActivityData;
use serenity::model::user::OnlineStatus;
use serenity::prelude::Context;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Watching,
    Listening,
    Playing,
    Competing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub kind: ActivityKind,
    pub name: &'static str,
}

const ACTIVITIES: &[(ActivityKind, &[&str])] = &[
    (
        ActivityKind::Watching,
        &["the lazer shine!", "the mouse on screen!", "Wavy snore!", "a spider on the wall!"],
    ),
    (
        ActivityKind::Listening,
        &["the birds!", "the rain!", "the music!", "the TV!"],
    ),
    (
        ActivityKind::Playing,
        &["with the ball!", "with the yarn!", "with the mouse!", "with the lazer!"],
    ),
    (
        ActivityKind::Competing,
        &["fastest pounce!", "best zoomies", "loudest mew!"],
    ),
];

impl Activity {
    pub fn to_activity_data(self) -> ActivityData {
        match self.kind {
            ActivityKind::Watching => ActivityData::watching(self.name),
            ActivityKind::Listening => ActivityData::listening(self.name),
            ActivityKind::Playing => ActivityData::playing(self.name),
            ActivityKind::Competing => ActivityData::competing(self.name),
        }
    }
}

pub fn random_activity<R: Rng>(rng: &mut R) -> Activity {
    let (kind, names) = ACTIVITIES
        .choose(rng)
        .copied()
        .unwrap_or((ActivityKind::Playing, &["with the yarn!"][..]));
    Activity {
        kind,
        name: names.choose(rng).copied().unwrap_or("with the yarn!"),
    }
}

/// Emit one activity immediately, then one per `period`, until the
/// receiver goes away.
pub async fn run_rotation(period: Duration, tx: mpsc::Sender<Activity>) {
    let mut tick = tokio::time::interval(period);
    loop {
        tick.tick().await;
        let activity = random_activity(&mut rand::thread_rng());
        if tx.send(activity).await.is_err() {
            debug!("presence receiver closed, stopping rotation");
            return;
        }
    }
}

/// Apply activities from the rotation to the gateway session.
pub async fn apply_presence(ctx: Context, mut rx: mpsc::Receiver<Activity>) {
    while let Some(activity) = rx.recv().await {
        debug!(?activity.kind, name = activity.name, "updating presence");
        ctx.set_presence(Some(activity.to_activity_data()), OnlineStatus::Online);
    }
    info!("presence task exiting (channel closed)");
}
