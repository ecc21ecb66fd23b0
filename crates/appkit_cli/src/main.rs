//! CLI entry point for the application scaffold.
//!
//! # Responsibility
//! - Check `appkit_core` linkage (`ping`, `version`).
//! - Run a small lifecycle demo that prints dispatch order, so option
//!   effects like `--all-ext-first` can be checked by eye.

use appkit_core::{
    init_logging, Application, CallTarget, Extension, ExtensionHandle, HandlerError, HookResult,
    LoggingConfig, ReadySignal,
};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;

/// Application scaffold command-line tools.
#[derive(Parser, Debug)]
#[command(name = "appkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the core health-check response.
    Ping,
    /// Print the core crate version.
    Version,
    /// Build a demo application and print lifecycle dispatch order.
    Demo {
        /// Notify extensions before the application itself.
        #[arg(long)]
        all_ext_first: bool,
        /// Do not schedule `start` when the environment becomes ready.
        #[arg(long)]
        no_auto_start: bool,
        /// Absolute directory for rolling log files. Logging stays off when omitted.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Log level used with `--log-dir`.
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match args.command {
        Command::Ping => println!("appkit_core ping={}", appkit_core::ping()),
        Command::Version => println!("appkit_core version={}", appkit_core::core_version()),
        Command::Demo {
            all_ext_first,
            no_auto_start,
            log_dir,
            log_level,
        } => {
            if let Some(log_dir) = log_dir {
                if let Err(err) = init_logging(&LoggingConfig::new(log_level, log_dir)) {
                    eprintln!("logging disabled: {err}");
                }
            }
            if let Err(err) = run_demo(all_ext_first, !no_auto_start) {
                eprintln!("demo failed: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Prints each lifecycle hook it receives.
struct Announcer {
    label: &'static str,
}

impl Announcer {
    fn announce(&self, event: &str) -> HookResult {
        println!("  {}:{}", self.label, event);
        Ok(())
    }
}

impl Extension for Announcer {
    fn declared_id(&self) -> Option<String> {
        Some(self.label.to_string())
    }

    fn on_init(&self, _ext: &ExtensionHandle, _args: &[Value]) -> HookResult {
        self.announce("init")
    }

    fn on_reinit(&self, _ext: &ExtensionHandle, _args: &[Value]) -> HookResult {
        self.announce("reinit")
    }

    fn on_start(&self, _ext: &ExtensionHandle, _args: &[Value]) -> HookResult {
        self.announce("start")
    }

    fn on_restart(&self, _ext: &ExtensionHandle, _args: &[Value]) -> HookResult {
        self.announce("restart")
    }

    fn call_method(
        &self,
        name: &str,
        _ext: &ExtensionHandle,
        _args: &[Value],
    ) -> Option<Result<Value, HandlerError>> {
        (name == "describe").then(|| Ok(json!(format!("announcer {}", self.label))))
    }
}

/// Silent extension with no `describe` method.
struct Counter;

impl Extension for Counter {}

fn run_demo(all_ext_first: bool, auto_start: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = Application::builder()
        .name("demo")
        .all_ext_first(all_ext_first)
        .auto_start(auto_start);
    for event in ["init", "reinit", "start", "restart"] {
        builder = builder.on(event, move |_| {
            println!("  app:{event}");
            Ok(())
        });
    }

    println!("construct:");
    let app = builder.build()?;

    println!("add:");
    app.add(ExtensionHandle::new(Announcer { label: "alpha" }))?;
    app.add(ExtensionHandle::new(Announcer { label: "beta" }))?;
    app.add(ExtensionHandle::new(Counter))?;

    println!("ready:");
    let signal = ReadySignal::new();
    let scheduled = app.attach_to_environment(&signal);
    let ran = signal.mark_ready();
    info!(
        "event=demo_ready module=cli status=ok scheduled={} ran={}",
        scheduled, ran
    );
    if !app.is_started() {
        println!("  (auto start disabled)");
    }

    println!("start:");
    app.start()?;

    println!("reinit:");
    app.init(&[json!("again")])?;

    println!("describe:");
    let results = app.ext_call_collect(CallTarget::method("describe"), &[])?;
    for extension in app.extensions() {
        let id = extension.id()?;
        let value = results.get(&extension).unwrap_or(Value::Null);
        println!("  {id} => {value}");
    }
    Ok(())
}
