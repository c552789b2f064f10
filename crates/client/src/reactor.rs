//! Side effects of auth-state changes.
//!
//! [`react`] is a pure function from the previous and the new
//! [`AuthState`] to the [`Command`]s to run. [`AuthReactor`] subscribes to an
//! identity provider and runs those commands:
//!
//! - signed in: preload the user's data in the background, and show the
//!   email-verification notice if the address is unverified
//! - signed out: clear the cache
//!
//! Preload failures are logged and never surface to the user.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use grocer_core::UserId;

use crate::identity::{AuthState, AuthSubscription};
use crate::remote::DocumentStore;
use crate::services::{PreloadReport, UserDataService};

const EVENT_BUFFER: usize = 32;

/// A side effect requested by an auth-state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch and cache the user's data.
    Preload(UserId),
    /// Ask the user to verify their email address.
    ShowVerificationNotice,
    /// Remove all cached user data.
    ClearCache,
}

/// Commands for the transition from `previous` to `next`.
///
/// `previous` is `None` for the first notification of a subscription.
#[must_use]
pub fn react(previous: Option<&AuthState>, next: &AuthState) -> Vec<Command> {
    match next {
        AuthState::Anonymous => vec![Command::ClearCache],
        AuthState::Authenticated(user) => {
            if previous == Some(next) {
                return Vec::new();
            }

            let mut commands = Vec::with_capacity(2);
            let same_user = previous
                .and_then(AuthState::user)
                .is_some_and(|prev| prev.uid == user.uid);
            if !same_user {
                commands.push(Command::Preload(user.uid.clone()));
            }
            if !user.email_verified {
                commands.push(Command::ShowVerificationNotice);
            }
            commands
        }
    }
}

/// A user-visible prompt to verify the email address.
pub trait VerificationNotice: Send + Sync {
    /// Show the notice. Returns false if it was already showing.
    fn show(&self) -> bool;

    /// Hide the notice.
    fn dismiss(&self);
}

/// Tracks whether the verification notice is showing; at most one instance
/// is ever visible.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    visible: AtomicBool,
    shown: AtomicUsize,
}

impl NoticeBoard {
    /// Returns true while the notice is showing.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// How many times the notice has been shown.
    #[must_use]
    pub fn times_shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }
}

impl VerificationNotice for NoticeBoard {
    fn show(&self) -> bool {
        let newly_shown = !self.visible.swap(true, Ordering::SeqCst);
        if newly_shown {
            self.shown.fetch_add(1, Ordering::SeqCst);
        }
        newly_shown
    }

    fn dismiss(&self) {
        self.visible.store(false, Ordering::SeqCst);
    }
}

/// Something the reactor did.
#[derive(Debug)]
pub enum ReactorEvent {
    /// A background preload finished.
    Preloaded {
        uid: UserId,
        report: PreloadReport,
    },
    /// The cache was cleared.
    CacheCleared,
    /// The verification notice was put up.
    NoticeShown,
}

/// Runs [`react`] against an auth subscription.
pub struct AuthReactor<D> {
    service: Arc<UserDataService<D>>,
    notice: Arc<dyn VerificationNotice>,
    events: mpsc::Sender<ReactorEvent>,
    preload: Option<JoinHandle<()>>,
}

impl<D: DocumentStore + 'static> AuthReactor<D> {
    /// Start reacting to `subscription` on a new task.
    ///
    /// The state current at subscription time is handled first.
    #[must_use]
    pub fn spawn(
        mut subscription: AuthSubscription,
        service: Arc<UserDataService<D>>,
        notice: Arc<dyn VerificationNotice>,
    ) -> ReactorHandle {
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let mut reactor = Self {
            service,
            notice,
            events,
            preload: None,
        };

        let task = tokio::spawn(async move {
            let mut previous: Option<AuthState> = None;
            while let Some(state) = subscription.next().await {
                for command in react(previous.as_ref(), &state) {
                    reactor.execute(command);
                }
                previous = Some(state);
            }
            debug!("Auth subscription closed, reactor stopping");
        });

        ReactorHandle {
            task,
            events: receiver,
        }
    }

    fn execute(&mut self, command: Command) {
        debug!(command = ?command, "Executing auth command");
        match command {
            Command::Preload(uid) => {
                let service = Arc::clone(&self.service);
                let events = self.events.clone();
                let task = tokio::spawn(async move {
                    let report = service.preload(&uid).await;
                    if report.is_superseded() {
                        debug!(uid = %uid, "Preload superseded by a cache clear");
                        return;
                    }
                    if !report.is_complete() {
                        warn!(uid = %uid, failed = report.failed.len(), "Background preload incomplete");
                    }
                    let _ = events.try_send(ReactorEvent::Preloaded { uid, report });
                });
                if let Some(previous) = self.preload.replace(task) {
                    previous.abort();
                }
            }
            Command::ClearCache => {
                // An aborted preload may still be writing on another worker;
                // the cache generation makes those writes no-ops.
                if let Some(preload) = self.preload.take() {
                    preload.abort();
                }
                self.service.clear_cache();
                let _ = self.events.try_send(ReactorEvent::CacheCleared);
            }
            Command::ShowVerificationNotice => {
                if self.notice.show() {
                    info!("Email not verified, verification notice shown");
                    let _ = self.events.try_send(ReactorEvent::NoticeShown);
                }
            }
        }
    }
}

/// Handle to a running [`AuthReactor`]. Dropping it stops the reactor.
#[derive(Debug)]
pub struct ReactorHandle {
    task: JoinHandle<()>,
    events: mpsc::Receiver<ReactorEvent>,
}

impl ReactorHandle {
    /// Stop reacting to auth-state changes.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Returns true once the reactor has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the next thing the reactor does.
    ///
    /// Events are buffered; when the buffer is full new events are dropped.
    /// Returns `None` once the reactor and its preloads have stopped.
    pub async fn next_event(&mut self) -> Option<ReactorEvent> {
        self.events.recv().await
    }
}

impl Drop for ReactorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use grocer_core::Email;

    use super::*;
    use crate::identity::AuthUser;

    fn signed_in(uid: &str, verified: bool) -> AuthState {
        AuthState::Authenticated(AuthUser {
            uid: UserId::new(uid),
            email: Email::parse("shopper@example.com").ok(),
            email_verified: verified,
        })
    }

    #[test]
    fn test_sign_in_preloads() {
        assert_eq!(
            react(None, &signed_in("u1", true)),
            vec![Command::Preload(UserId::new("u1"))]
        );
        assert_eq!(
            react(Some(&AuthState::Anonymous), &signed_in("u1", true)),
            vec![Command::Preload(UserId::new("u1"))]
        );
    }

    #[test]
    fn test_unverified_sign_in_shows_notice() {
        assert_eq!(
            react(Some(&AuthState::Anonymous), &signed_in("u1", false)),
            vec![Command::Preload(UserId::new("u1")), Command::ShowVerificationNotice]
        );
    }

    #[test]
    fn test_sign_out_clears_cache() {
        assert_eq!(
            react(Some(&signed_in("u1", true)), &AuthState::Anonymous),
            vec![Command::ClearCache]
        );
        // Also on the initial notification.
        assert_eq!(react(None, &AuthState::Anonymous), vec![Command::ClearCache]);
    }

    #[test]
    fn test_repeated_state_is_ignored() {
        let state = signed_in("u1", false);
        assert!(react(Some(&state), &state).is_empty());
    }

    #[test]
    fn test_verification_of_same_user_does_not_preload() {
        assert!(react(Some(&signed_in("u1", false)), &signed_in("u1", true)).is_empty());
    }

    #[test]
    fn test_switching_user_preloads() {
        assert_eq!(
            react(Some(&signed_in("u1", true)), &signed_in("u2", true)),
            vec![Command::Preload(UserId::new("u2"))]
        );
    }

    #[test]
    fn test_notice_board_is_idempotent() {
        let board = NoticeBoard::default();
        assert!(board.show());
        assert!(!board.show());
        assert!(board.is_visible());
        assert_eq!(board.times_shown(), 1);

        board.dismiss();
        assert!(!board.is_visible());
        assert!(board.show());
        assert_eq!(board.times_shown(), 2);
    }
}
