//! skein demo: a search box wired with takeLatest and throttle.
//!
//! `SKEIN_SCRIPT` に JSON のスクリプトを渡すと、その message 列を流します。
//! `RUST_LOG=skein_core=debug` で task の起動・終了が見えます。

use std::rc::Rc;
use std::time::Duration;

use serde::Deserialize;
use skein_core::domain::Message;
use skein_core::effects;
use skein_core::impls::{MemoryEnv, RecordingMonitor};
use skein_core::{Routine, RuntimeBuilder, RuntimeConfig, Value};
use tokio::task::LocalSet;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const DEFAULT_SCRIPT: &str = r#"{
  "steps": [
    { "message": { "type": "SEARCH", "payload": "ru" } },
    { "message": { "type": "SEARCH", "payload": "rus" } },
    { "message": { "type": "SEARCH", "payload": "rust" }, "wait_ms": 400 },
    { "message": { "type": "SCROLL", "payload": 1 } },
    { "message": { "type": "SCROLL", "payload": 2 } },
    { "message": { "type": "SCROLL", "payload": 3 }, "wait_ms": 300 }
  ]
}"#;

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    config: RuntimeConfig,
    steps: Vec<ScriptStep>,
}

#[derive(Debug, Deserialize)]
struct ScriptStep {
    message: Message,
    /// 送信後に待つ時間
    #[serde(default)]
    wait_ms: u64,
}

fn search() -> Routine {
    Routine::saga("search", |cx, args| async move {
        let query = args
            .last()
            .and_then(Value::as_message)
            .map(|m| m.payload().clone())
            .unwrap_or_default();
        cx.delay(Duration::from_millis(200)).await?;
        cx.put(Message::with_payload("RESULTS", query)).await?;
        Ok(Value::Unit)
    })
}

fn load_more() -> Routine {
    Routine::saga("load_more", |cx, args| async move {
        let page = args
            .last()
            .and_then(Value::as_message)
            .map(|m| m.payload().clone())
            .unwrap_or_default();
        cx.put(Message::with_payload("PAGE_LOADED", page)).await?;
        Ok(Value::Unit)
    })
}

fn root() -> Routine {
    let (search, load_more) = (search(), load_more());
    Routine::saga("root", move |cx, _| {
        let (search, load_more) = (search.clone(), load_more.clone());
        async move {
            cx.run(effects::take_latest("SEARCH", &search, vec![])).await?;
            cx.run(effects::throttle(
                Duration::from_millis(250),
                "SCROLL",
                &load_more,
                vec![],
            ))
            .await?;
            Ok(Value::Unit)
        }
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let raw = std::env::var("SKEIN_SCRIPT").unwrap_or_else(|_| DEFAULT_SCRIPT.to_string());
    let script: Script = match serde_json::from_str(&raw) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("invalid script: {e}");
            std::process::exit(2);
        }
    };

    LocalSet::new()
        .run_until(async move {
            let env = Rc::new(MemoryEnv::new());
            let monitor = Rc::new(RecordingMonitor::new());
            let runtime = match RuntimeBuilder::new(env.clone())
                .config(script.config)
                .monitor(monitor.clone())
                .on_error(|e| tracing::error!(error = %e, "saga failed"))
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("failed to build runtime: {e}");
                    std::process::exit(2);
                }
            };

            let task = match runtime.run(&root(), vec![]) {
                Ok(task) => task,
                Err(e) => {
                    eprintln!("failed to start: {e}");
                    std::process::exit(1);
                }
            };

            for step in script.steps {
                tracing::info!(kind = %step.message.kind(), "emit");
                if let Err(e) = env.emit(step.message) {
                    tracing::warn!(error = %e, "emit failed");
                }
                if step.wait_ms > 0 {
                    sleep(Duration::from_millis(step.wait_ms)).await;
                }
            }
            task.cancel();

            println!("dispatched:");
            for message in env.dispatched() {
                println!("  {}", serde_json::to_string(&message).unwrap_or_default());
            }
            match monitor.to_json() {
                Ok(json) => println!("effects:\n{json}"),
                Err(e) => eprintln!("{e}"),
            }
        })
        .await;
}
