//! Command dispatcher
//!
//! Resolves a command to its handler, enforces login, runs the middleware
//! chain and routes the outcome to the connection's writer. Abortable
//! commands run on their own task so the connection keeps reading (and can
//! see ABOR) while they transfer.

use log::error;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::client::Session;
use crate::commands::{CommandContext, CommandRegistry, default_registry};
use crate::error::{CommandError, handle_error};
use crate::middleware::{CommandMiddleware, LoggingMiddleware, Next};
use crate::protocol::{Command, Reply, codes};

/// An abortable command running on its own task.
pub struct BackgroundCommand {
    verb: String,
    cancel: CancellationToken,
    handle: JoinHandle<Reply>,
}

impl BackgroundCommand {
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Cancels the command; it finishes with a 426 reply.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the command's final reply.
    pub async fn join(self) -> Reply {
        task_reply(&self.verb, self.handle.await)
    }
}

/// Waits for the command in `slot` to finish, clears the slot and returns the
/// command's reply. Never resolves while the slot is empty.
pub async fn wait_background(slot: &mut Option<BackgroundCommand>) -> Reply {
    let Some(running) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let result = (&mut running.handle).await;
    let verb = running.verb.clone();
    *slot = None;
    task_reply(&verb, result)
}

fn task_reply(verb: &str, result: Result<Reply, JoinError>) -> Reply {
    match result {
        Ok(reply) => reply,
        Err(e) => {
            error!("{} task failed: {}", verb, e);
            CommandError::Internal(e.to_string()).reply()
        }
    }
}

pub struct Dispatcher {
    registry: CommandRegistry,
    middleware: Vec<Arc<dyn CommandMiddleware>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(default_registry()).with_middleware(LoggingMiddleware)
    }
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self {
            registry,
            middleware: Vec::new(),
        }
    }

    /// Appends a middleware. The first one added is the outermost.
    pub fn with_middleware(mut self, middleware: impl CommandMiddleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Runs one command. Synchronous commands have replied by the time this
    /// returns; an abortable one is left in `background` and replies when it
    /// completes.
    pub async fn dispatch(
        self: &Arc<Self>,
        session: &Arc<Session>,
        command: Command,
        background: &mut Option<BackgroundCommand>,
    ) {
        let Some(registration) = self.registry.resolve(&command) else {
            session.reply(Reply::new(
                codes::SYNTAX_ERROR,
                format!("Command '{}' not understood.", command.verb()),
            ));
            return;
        };

        if registration.is_login_required() && !session.is_authorized() {
            session.reply(Reply::new(
                codes::NOT_LOGGED_IN,
                "Please login with USER and PASS.",
            ));
            return;
        }

        let verb = command.verb().to_string();
        let handler = Arc::clone(registration.handler());

        if !registration.is_abortable() {
            let ctx = CommandContext::new(
                Arc::clone(session),
                command,
                session.cancel_token().child_token(),
            );
            let result = Next::new(&self.middleware, handler.as_ref()).run(&ctx).await;
            let reply = conclude(session, &verb, result);
            session.reply(reply);
            return;
        }

        if let Some(running) = background.as_ref() {
            session.reply(Reply::new(
                codes::BAD_SEQUENCE,
                format!("{} is still in progress.", running.verb()),
            ));
            return;
        }

        let cancel = session.cancel_token().child_token();
        let ctx = CommandContext::new(Arc::clone(session), command, cancel.clone());
        let dispatcher = Arc::clone(self);
        let task_verb = verb.clone();
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => Err(CommandError::Aborted),
                result = Next::new(&dispatcher.middleware, handler.as_ref()).run(&ctx) => result,
            };
            conclude(&ctx.session, &task_verb, result)
        });

        *background = Some(BackgroundCommand {
            verb,
            cancel,
            handle,
        });
    }
}

/// Turns a handler outcome into the reply and advances the login state.
fn conclude(session: &Session, verb: &str, result: Result<Reply, CommandError>) -> Reply {
    let reply = match result {
        Ok(reply) => reply,
        Err(e) => {
            handle_error(session.id(), verb, &e);
            e.reply()
        }
    };
    session.advance_login(verb, reply.code());
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundTransferQueue;
    use crate::client::ReplySender;
    use crate::client::writer::WriterMessage;
    use crate::commands::{CommandHandler, HandlerRegistration};
    use crate::config::{RuntimeConfig, StartupConfig};
    use crate::error::FileSystemError;
    use crate::protocol::SharedEncoding;
    use crate::server::ServerServices;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::{RwLock, mpsc};

    struct Harness {
        session: Arc<Session>,
        replies: mpsc::UnboundedReceiver<WriterMessage>,
        _root: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let config = StartupConfig {
                server_root: root.path().to_string_lossy().into_owned(),
                ..StartupConfig::default()
            };
            let services = ServerServices::new(
                config,
                Arc::new(RwLock::new(RuntimeConfig::default())),
                Arc::new(BackgroundTransferQueue::new()),
            );
            let (sender, replies) = ReplySender::channel();
            let session = Session::new(
                1,
                "127.0.0.1:40000".parse().unwrap(),
                "127.0.0.1:2121".parse().unwrap(),
                Arc::new(services),
                sender,
                SharedEncoding::default(),
                CancellationToken::new(),
            );
            Self {
                session: Arc::new(session),
                replies,
                _root: root,
            }
        }

        async fn next_reply(&mut self) -> Reply {
            match self.replies.recv().await {
                Some(WriterMessage::Reply(reply)) => reply,
                _ => panic!("expected a reply"),
            }
        }

        async fn run(&mut self, dispatcher: &Arc<Dispatcher>, line: &str) -> Reply {
            let mut background = None;
            dispatcher
                .dispatch(&self.session, Command::parse(line), &mut background)
                .await;
            assert!(background.is_none());
            self.next_reply().await
        }

        async fn login(&mut self, dispatcher: &Arc<Dispatcher>) {
            assert_eq!(self.run(dispatcher, "USER anonymous").await.code(), 331);
            assert_eq!(self.run(dispatcher, "PASS guest@").await.code(), 230);
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl CommandHandler for Counting {
        async fn handle(&self, _ctx: &CommandContext) -> Result<Reply, CommandError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::new(200, "counted"))
        }
    }

    struct Sleepy;

    #[async_trait]
    impl CommandHandler for Sleepy {
        async fn handle(&self, _ctx: &CommandContext) -> Result<Reply, CommandError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Reply::new(226, "done"))
        }
    }

    struct Failing(fn() -> CommandError);

    #[async_trait]
    impl CommandHandler for Failing {
        async fn handle(&self, _ctx: &CommandContext) -> Result<Reply, CommandError> {
            Err((self.0)())
        }
    }

    struct Recording(&'static str, Arc<Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl CommandMiddleware for Recording {
        async fn handle(&self, ctx: &CommandContext, next: Next<'_>) -> Result<Reply, CommandError> {
            self.1.lock().push(self.0);
            next.run(ctx).await
        }
    }

    fn dispatcher_with(extra: impl FnOnce(&mut CommandRegistry)) -> Arc<Dispatcher> {
        let mut registry = default_registry();
        extra(&mut registry);
        Arc::new(Dispatcher::new(registry))
    }

    #[tokio::test]
    async fn test_unknown_verb_is_500() {
        let mut harness = Harness::new();
        let dispatcher = Arc::new(Dispatcher::default());
        assert_eq!(harness.run(&dispatcher, "XYZZY").await.code(), 500);
    }

    #[tokio::test]
    async fn test_login_required_bypasses_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = Arc::clone(&calls);
        let dispatcher = dispatcher_with(move |registry| {
            registry.register(HandlerRegistration::new("PING", Counting(counting)));
        });
        let mut harness = Harness::new();

        assert_eq!(harness.run(&dispatcher, "PING").await.code(), 530);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        harness.login(&dispatcher).await;
        assert_eq!(harness.run(&dispatcher, "PING").await.code(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_state_follows_reply_codes() {
        let dispatcher = Arc::new(Dispatcher::default());
        let mut harness = Harness::new();

        assert_eq!(harness.run(&dispatcher, "PASS nope").await.code(), 503);
        assert!(!harness.session.is_authorized());

        harness.login(&dispatcher).await;
        assert!(harness.session.is_authorized());

        assert_eq!(harness.run(&dispatcher, "REIN").await.code(), 220);
        assert!(!harness.session.is_authorized());
        assert_eq!(harness.run(&dispatcher, "PWD").await.code(), 530);
    }

    #[tokio::test]
    async fn test_concurrent_abortable_rejected_and_abort_replies_426() {
        let dispatcher = dispatcher_with(|registry| {
            registry.register(HandlerRegistration::new("SLOW", Sleepy).abortable());
        });
        let mut harness = Harness::new();
        harness.login(&dispatcher).await;

        let mut background = None;
        dispatcher
            .dispatch(&harness.session, Command::parse("SLOW"), &mut background)
            .await;
        let running = background.as_ref().unwrap();
        assert_eq!(running.verb(), "SLOW");
        assert!(!running.is_finished());

        dispatcher
            .dispatch(&harness.session, Command::parse("SLOW"), &mut background)
            .await;
        assert_eq!(harness.next_reply().await.code(), 503);

        let running = background.take().unwrap();
        running.abort();
        assert_eq!(running.join().await.code(), 426);
    }

    #[tokio::test]
    async fn test_middleware_runs_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(
            Dispatcher::new(default_registry())
                .with_middleware(Recording("outer", Arc::clone(&order)))
                .with_middleware(Recording("inner", Arc::clone(&order))),
        );
        let mut harness = Harness::new();

        assert_eq!(harness.run(&dispatcher, "NOOP").await.code(), 200);
        assert_eq!(*order.lock(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_errors_map_to_reply_codes() {
        let dispatcher = dispatcher_with(|registry| {
            registry
                .register(
                    HandlerRegistration::new(
                        "MISSING",
                        Failing(|| FileSystemError::NotFound("/x".into()).into()),
                    )
                    .public(),
                )
                .register(
                    HandlerRegistration::new(
                        "UNSUPPORTED",
                        Failing(|| CommandError::NotSupported("x".into())),
                    )
                    .public(),
                )
                .register(
                    HandlerRegistration::new(
                        "BROKEN",
                        Failing(|| CommandError::Internal("boom".into())),
                    )
                    .public(),
                );
        });
        let mut harness = Harness::new();

        assert_eq!(harness.run(&dispatcher, "MISSING").await.code(), 550);
        assert_eq!(harness.run(&dispatcher, "UNSUPPORTED").await.code(), 502);
        assert_eq!(harness.run(&dispatcher, "BROKEN").await.code(), 501);
        // The connection survives handler errors.
        assert_eq!(harness.run(&dispatcher, "NOOP").await.code(), 200);
    }

    #[tokio::test]
    async fn test_terminal_reply_closes_connection() {
        use crate::client::writer::spawn_writer;
        use crate::error::TlsError;
        use crate::tls::{Rewind, SecureStream};
        use tokio::io::AsyncReadExt;
        use tokio::net::{TcpListener, TcpStream};

        let dispatcher = dispatcher_with(|registry| {
            registry.register(
                HandlerRegistration::new("FATAL", Failing(|| TlsError::AlreadySecure.into()))
                    .public(),
            );
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server_side, peer) = listener.accept().await.unwrap();
        let local = server_side.local_addr().unwrap();
        let (_reader, write_half) = tokio::io::split(SecureStream::Plain(Rewind::new(server_side)));

        let root = TempDir::new().unwrap();
        let services = ServerServices::new(
            StartupConfig {
                server_root: root.path().to_string_lossy().into_owned(),
                ..StartupConfig::default()
            },
            Arc::new(RwLock::new(RuntimeConfig::default())),
            Arc::new(BackgroundTransferQueue::new()),
        );
        let encoding = SharedEncoding::default();
        let cancel = CancellationToken::new();
        let (sender, writer) = spawn_writer(write_half, encoding.clone(), cancel.clone(), 7);
        let session = Arc::new(Session::new(
            7,
            peer,
            local,
            Arc::new(services),
            sender,
            encoding,
            cancel.clone(),
        ));

        let mut background = None;
        dispatcher
            .dispatch(&session, Command::parse("FATAL"), &mut background)
            .await;
        // Queued after the terminal reply, never written.
        session.reply(Reply::new(200, "too late"));

        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        let received = String::from_utf8(received).unwrap();
        assert!(received.starts_with("421 "), "{received:?}");
        assert!(!received.contains("too late"));

        tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .unwrap()
            .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_background_clears_slot() {
        let dispatcher = Arc::new(Dispatcher::default());
        let mut harness = Harness::new();
        harness.login(&dispatcher).await;

        let mut background = None;
        dispatcher
            .dispatch(&harness.session, Command::parse("NLST"), &mut background)
            .await;
        assert!(background.is_some());
        let reply = wait_background(&mut background).await;
        assert_eq!(reply.code(), 425);
        assert!(background.is_none());

        let idle = tokio::time::timeout(
            Duration::from_millis(50),
            wait_background(&mut background),
        )
        .await;
        assert!(idle.is_err());
    }

    #[tokio::test]
    async fn test_transfer_without_data_connection_is_425() {
        let dispatcher = Arc::new(Dispatcher::default());
        let mut harness = Harness::new();
        harness.login(&dispatcher).await;

        let mut background = None;
        dispatcher
            .dispatch(&harness.session, Command::parse("LIST"), &mut background)
            .await;
        let reply = background.take().unwrap().join().await;
        assert_eq!(reply.code(), 425);
    }
}
