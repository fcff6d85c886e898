//! Runs a script through the flat API, the way a foreign embedder would.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::ffi::{c_char, CString};
use std::path::PathBuf;
use std::ptr;
use v8_glue::api::{engine::*, isolate::*, script::*, value::*};
use v8_glue::{CallContext, ContextRef, IsolatePtr, MessageRef, ValueRef};

#[derive(Parser)]
struct Args {
    /// Source to evaluate.
    #[clap(short, long, default_value = "1+2")]
    eval: String,

    /// Evaluate this file instead of `--eval`.
    #[clap(short, long)]
    file: Option<PathBuf>,

    /// Terminate the script after this many milliseconds.
    #[clap(short, long)]
    timeout_ms: Option<u64>,

    /// Bridge configuration as a JSON document.
    #[clap(short, long)]
    config: Option<String>,
}

struct Session {
    isolate: IsolatePtr,
    context: ContextRef,
    exception: ValueRef,
    message: MessageRef,
}

impl Session {
    unsafe fn open() -> Result<Session> {
        let isolate = v8glue_isolate_new(v8glue_allocator_create_default());
        if isolate.is_null() {
            bail!("could not create an isolate");
        }
        let context = v8glue_context_new(isolate);
        Ok(Session {
            isolate,
            context,
            exception: ptr::null_mut(),
            message: ptr::null_mut(),
        })
    }

    fn ctx(&mut self) -> CallContext {
        CallContext {
            isolate: self.isolate,
            exception: &mut self.exception,
            message: &mut self.message,
        }
    }

    unsafe fn run(&mut self, source: &str, timeout_ms: Option<u64>) -> Result<ValueRef> {
        let ctx = self.ctx();
        let source = v8glue_string_new_from_utf8_normal(
            &ctx,
            source.as_ptr() as *const c_char,
            i32::try_from(source.len()).context("script too long")?,
        );
        let script = v8glue_script_compile(&ctx, self.context, source);
        v8glue_value_release(source);
        let result = match timeout_ms {
            Some(timeout_ms) => {
                v8glue_script_run_with_timeout(&ctx, self.context, script, timeout_ms)
            }
            None => v8glue_script_run(&ctx, self.context, script),
        };
        v8glue_script_release(script);

        if result.is_null() {
            bail!("{}", self.describe_exception());
        }
        Ok(result)
    }

    unsafe fn describe_exception(&mut self) -> String {
        if self.message.is_null() {
            if self.exception.is_null() {
                return "script produced no value".to_owned();
            }
            return self.display(self.exception);
        }
        let ctx = self.ctx();
        let text = v8glue_message_get(&ctx, self.context, self.message);
        let line = v8glue_message_get_line_number(&ctx, self.context, self.message);
        let description = self.display(text);
        v8glue_value_release(text);
        let mut description = if line.is_set {
            format!("{} (line {})", description, line.value)
        } else {
            description
        };
        for frame in self.backtrace() {
            description.push_str("\n    ");
            description.push_str(&frame);
        }
        description
    }

    /// Renders a value the way `String(value)` would.
    unsafe fn display(&mut self, value: ValueRef) -> String {
        // a failing conversion must not clobber the exception being described
        let ctx = CallContext {
            isolate: self.isolate,
            exception: ptr::null_mut(),
            message: ptr::null_mut(),
        };
        let string = v8glue_value_to_string(&ctx, self.context, value);
        if string.is_null() {
            return "<unprintable value>".to_owned();
        }

        let length = v8glue_string_utf8_length(&ctx, string).max(0);
        let mut buffer = vec![0u8; length as usize];
        let written =
            v8glue_string_write_utf8(&ctx, string, buffer.as_mut_ptr() as *mut c_char, length);
        buffer.truncate(written.max(0) as usize);
        v8glue_value_release(string);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// One `at function (line N)` line per frame recorded with the current message.
    unsafe fn backtrace(&mut self) -> Vec<String> {
        let ctx = self.ctx();
        let trace = v8glue_message_get_stack_trace(&ctx, self.context, self.message);
        let mut lines = Vec::new();
        for index in 0..v8glue_stack_trace_get_frame_count(&ctx, trace).max(0) {
            let mut frame = StackFrame::default();
            if !v8glue_stack_trace_get_frame(&ctx, self.context, trace, index, &mut frame) {
                break;
            }
            let function = if frame.function_name.is_null() {
                "<top level>".to_owned()
            } else {
                self.display(frame.function_name)
            };
            lines.push(format!("at {} (line {})", function, frame.line_number));
            v8glue_value_release(frame.function_name);
            v8glue_value_release(frame.script_name);
        }
        v8glue_stack_trace_release(trace);
        lines
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        unsafe {
            v8glue_value_release(self.exception);
            v8glue_message_release(self.message);
            v8glue_context_release(self.context);
            v8glue_isolate_dispose(self.isolate);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let source = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => args.eval.clone(),
    };
    let config = args
        .config
        .map(CString::new)
        .transpose()
        .context("configuration contains a nul byte")?;

    unsafe {
        if !v8glue_configure(config.as_ref().map_or(ptr::null(), |config| config.as_ptr())) {
            bail!("invalid configuration");
        }
        if !v8glue_v8_initialize_platform(v8glue_platform_create_default())
            || !v8glue_v8_initialize()
        {
            bail!("engine failed to start");
        }

        let outcome = {
            let mut session = Session::open()?;
            let outcome = session.run(&source, args.timeout_ms).map(|result| {
                let shown = session.display(result);
                v8glue_value_release(result);
                shown
            });
            v8glue_isolate_run_enqueued_tasks(session.isolate);
            outcome
        };

        v8glue_v8_dispose();
        v8glue_v8_shutdown_platform();

        let shown = outcome?;
        info!("script finished");
        println!("{}", shown);
    }
    Ok(())
}
