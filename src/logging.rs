use crate::config::BridgeConfig;
use anyhow::{Context, Result};
use log::error;
use std::ffi::{c_char, CStr, CString};
use std::sync::RwLock;
use std::thread;

/// Receives a location and a message for conditions the bridge cannot report through a
/// capture context. The process aborts once it returns.
pub type FatalErrorCallback = unsafe extern "C" fn(location: *const c_char, message: *const c_char);

static FATAL_ERROR_HANDLER: RwLock<Option<FatalErrorCallback>> = RwLock::new(None);

pub fn set_fatal_error_handler(handler: Option<FatalErrorCallback>) {
    match FATAL_ERROR_HANDLER.write() {
        Ok(mut guard) => *guard = handler,
        Err(poisoned) => *poisoned.into_inner() = handler,
    }
}

fn fatal_error_handler() -> Option<FatalErrorCallback> {
    match FATAL_ERROR_HANDLER.read() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Engine out-of-memory hook, installed on every isolate. Forwards to the fatal error handler.
pub(crate) extern "C" fn oom_error(location: *const c_char, details: &v8::OomDetails) {
    let describe = |ptr: *const c_char| {
        if ptr.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    };
    let location = describe(location);
    let detail = describe(details.detail);
    let kind = if details.is_heap_oom { "heap" } else { "process" };
    error!("{} out of memory at {}: {}", kind, location, detail);
    log::logger().flush();

    if let Some(handler) = fatal_error_handler() {
        let location = CString::new(location).unwrap_or_default();
        let message = format!("{} out of memory: {}", kind, detail);
        let message = CString::new(message).unwrap_or_default();
        unsafe { handler(location.as_ptr(), message.as_ptr()) };
    }
}

/// Installs the global logger and the panic hook.
///
/// Fails if a logger was already installed for this process.
pub fn setup(config: &BridgeConfig) -> Result<()> {
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(config.level_filter());

    let dispatch = match &config.log_file {
        Some(path) => dispatch.chain(
            fern::log_file(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?,
        ),
        None => dispatch.chain(std::io::stderr()),
    };

    dispatch
        .apply()
        .context("a logger is already installed")?;

    install_panic_hook();
    Ok(())
}

// log on panic, then hand the report to the embedder
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();

        let thread = thread::current();
        let thread = thread.name().unwrap_or("<unnamed>");
        let msg = match info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match info.payload().downcast_ref::<String>() {
                Some(s) => &**s,
                None => "Box<Any>",
            },
        };

        let location = info
            .location()
            .map(|location| format!("{}:{}", location.file(), location.line()))
            .unwrap_or_else(|| "<unknown>".to_owned());

        error!(
            "thread '{}' panicked at '{}': {}\nbacktrace:\n{:?}",
            thread, msg, location, backtrace
        );
        log::logger().flush();

        if let Some(handler) = fatal_error_handler() {
            let location = CString::new(location).unwrap_or_default();
            let message = CString::new(msg.replace('\0', " ")).unwrap_or_default();
            unsafe { handler(location.as_ptr(), message.as_ptr()) };
        }
    }));
}
