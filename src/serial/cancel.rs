//! Cooperative stop flag shared by the transport and connection loops.
//!
//! Loops poll [`CancelToken::is_cancelled`] at every iteration boundary. The
//! signal hooks never touch a port themselves: on SIGTERM (or Ctrl-C, for
//! hosts that opt in) they only flip every registered token, and the loops
//! tear down on their own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::OnceCell;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Cancel this token when the process receives SIGTERM (console close on
    /// Windows). Every opened serial port registers its token this way.
    ///
    /// Ctrl-C keeps its default behaviour.
    pub fn cancel_on_termination(&self) {
        TERMINATION.register(&self.flag);
    }

    /// Cancel this token on Ctrl-C.
    ///
    /// Installing the hook replaces the default Ctrl-C exit for the whole
    /// process, so only hosts that observe their own token should call this.
    pub fn cancel_on_interrupt(&self) {
        INTERRUPT.register(&self.flag);
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Interrupt,
}

impl Signal {
    fn name(self) -> &'static str {
        match self {
            Signal::Terminate => "SIGTERM",
            Signal::Interrupt => "SIGINT",
        }
    }
}

/// Tokens waiting on one signal, plus the thread that watches for it.
struct SignalHook {
    signal: Signal,
    tokens: Mutex<Vec<Weak<AtomicBool>>>,
    watcher: OnceCell<()>,
}

static TERMINATION: SignalHook = SignalHook::new(Signal::Terminate);
static INTERRUPT: SignalHook = SignalHook::new(Signal::Interrupt);

impl SignalHook {
    const fn new(signal: Signal) -> Self {
        Self {
            signal,
            tokens: Mutex::new(Vec::new()),
            watcher: OnceCell::new(),
        }
    }

    fn register(&'static self, flag: &Arc<AtomicBool>) {
        {
            let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
            tokens.retain(|weak| weak.strong_count() > 0);
            tokens.push(Arc::downgrade(flag));
        }
        self.watcher.get_or_init(|| {
            let spawned = std::thread::Builder::new()
                .name(format!("{}-watcher", self.signal.name().to_lowercase()))
                .spawn(move || watch(self));
            if let Err(e) = spawned {
                log::error!("Failed to start {} watcher: {}", self.signal.name(), e);
            }
        });
    }

    /// Flip every live token. Returns how many were flipped.
    fn notify(&self) -> usize {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.retain(|weak| weak.strong_count() > 0);
        for weak in tokens.iter() {
            if let Some(flag) = weak.upgrade() {
                flag.store(true, Ordering::Release);
            }
        }
        tokens.len()
    }
}

/// Cancel every token registered through [`CancelToken::cancel_on_termination`],
/// as a SIGTERM would.
///
/// Returns how many live tokens were flipped.
pub fn notify_termination() -> usize {
    TERMINATION.notify()
}

fn watch(hook: &'static SignalHook) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to build signal runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async {
        match hook.signal {
            Signal::Interrupt => loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Ctrl-C listener failed: {}", e);
                    break;
                }
                let flipped = hook.notify();
                log::info!("Received SIGINT, cancelling {} serial session(s)", flipped);
            },
            Signal::Terminate => watch_termination(hook).await,
        }
    });
}

#[cfg(unix)]
async fn watch_termination(hook: &'static SignalHook) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("SIGTERM handler unavailable: {}", e);
            return;
        }
    };
    while sigterm.recv().await.is_some() {
        let flipped = hook.notify();
        log::info!("Received SIGTERM, cancelling {} serial session(s)", flipped);
    }
}

#[cfg(windows)]
async fn watch_termination(hook: &'static SignalHook) {
    let mut close = match tokio::signal::windows::ctrl_close() {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Console close handler unavailable: {}", e);
            return;
        }
    };
    while close.recv().await.is_some() {
        let flipped = hook.notify();
        log::info!("Console closing, cancelling {} serial session(s)", flipped);
    }
}

#[cfg(not(any(unix, windows)))]
async fn watch_termination(_hook: &'static SignalHook) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_notify_termination_flips_registered_tokens() {
        let token = CancelToken::new();
        let bystander = CancelToken::new();
        token.cancel_on_termination();
        assert!(notify_termination() >= 1);
        assert!(token.is_cancelled());
        assert!(!bystander.is_cancelled());
    }

    #[test]
    fn test_dropped_tokens_leave_the_registry() {
        let hook = SignalHook::new(Signal::Terminate);
        let kept = Arc::new(AtomicBool::new(false));
        {
            let mut tokens = hook.tokens.lock().unwrap();
            tokens.push(Arc::downgrade(&kept));
            tokens.push(Arc::downgrade(&Arc::new(AtomicBool::new(false))));
        }
        assert_eq!(hook.notify(), 1);
        assert!(kept.load(Ordering::Acquire));
    }

    #[test]
    fn test_interrupt_hook_is_separate_from_termination() {
        let hook = SignalHook::new(Signal::Interrupt);
        let token = CancelToken::new();
        hook.tokens.lock().unwrap().push(Arc::downgrade(&token.flag));
        TERMINATION.notify();
        assert!(!token.is_cancelled());
        hook.notify();
        assert!(token.is_cancelled());
    }
}
