//! Unix signal handling. Handlers only touch atomics; a watcher thread turns
//! them into [`Control`] messages for the running engine.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use palette_pulse_core::Control;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static NEXT_SCENE: AtomicUsize = AtomicUsize::new(0);

const WATCH_INTERVAL: Duration = Duration::from_millis(25);

extern "C" fn request_shutdown(_: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

extern "C" fn request_next_scene(_: libc::c_int) {
    NEXT_SCENE.fetch_add(1, Ordering::SeqCst);
}

fn install(signal: libc::c_int, handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    // SAFETY: the handlers only store to atomics, which is async-signal-safe,
    // and `action` is fully initialised before it is passed on.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Installs handlers for SIGINT, SIGTERM and SIGHUP (shutdown) and SIGUSR1
/// (next scene), then forwards them to `controls` from a watcher thread.
pub fn forward_to(controls: Sender<Control>) -> io::Result<()> {
    for signal in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
        install(signal, request_shutdown)?;
    }
    install(libc::SIGUSR1, request_next_scene)?;

    thread::Builder::new()
        .name("signals".into())
        .spawn(move || watch(&controls))?;
    Ok(())
}

fn watch(controls: &Sender<Control>) {
    loop {
        for _ in 0..NEXT_SCENE.swap(0, Ordering::SeqCst) {
            tracing::info!("SIGUSR1 received, switching scene");
            if controls.send(Control::NextScene).is_err() {
                return;
            }
        }
        if SHUTDOWN.swap(false, Ordering::SeqCst) {
            tracing::info!("termination signal received, shutting down");
            if controls.send(Control::Shutdown).is_err() {
                return;
            }
        }
        thread::sleep(WATCH_INTERVAL);
    }
}
