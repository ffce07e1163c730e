use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Duration;
use tracing::{info, warn};

use sequent_core::{ServiceBuilder, ServiceConfig, TaskResult};

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
}

/// Greets, but fails the first `n` times it is asked to.
struct Greeter {
    remaining_failures: AtomicU32,
}

impl Greeter {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }

    fn greet(&self, payload: &[u8]) -> TaskResult<String> {
        let p: HelloPayload = serde_json::from_slice(payload)?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("intentional failure (left={left})").into());
        }

        Ok(format!("Hello, {}!", p.name))
    }
}

fn load_config() -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            let config = ServiceConfig::from_json_str(&json)?;
            info!(%path, "loaded configuration");
            Ok(config)
        }
        None => Ok(ServiceConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // (A) サービスを起動（worker は 1 本）
    let service = Arc::new(ServiceBuilder::from_config(load_config()?).build()?);
    let greeter = Arc::new(Greeter::new(1));

    // (B) タスク投入: 1 件目は失敗、2 件目は成功する
    let mut futures = Vec::new();
    for name in ["world", "sequent"] {
        let greeter = Arc::clone(&greeter);
        let payload = serde_json::to_vec(&serde_json::json!({ "name": name }))?;
        futures.push(service.submit(move || greeter.greet(&payload))?);
    }

    // (C) 結果を await で受け取る
    for future in futures {
        let id = future.id();
        match future.await {
            Ok(greeting) => println!("{id}: {greeting}"),
            Err(err) => match err.task_failure() {
                Some(failure) => println!("{id}: {failure}"),
                None => println!("{id}: {err}"),
            },
        }
    }

    // (D) invoke_any: worker は 1 本なので先頭のタスクが先に終わる
    // blocking API は spawn_blocking 側で呼ぶ
    let fastest = {
        let service = Arc::clone(&service);
        tokio::task::spawn_blocking(move || {
            service.invoke_any_timeout(
                [100, 10].map(|ms| {
                    move || {
                        std::thread::sleep(Duration::from_millis(ms));
                        Ok(ms)
                    }
                }),
                Duration::from_secs(1),
            )
        })
        .await??
    };
    println!("invoke_any returned the {fastest}ms task");

    // (E) drain して終了を待つ
    service.shutdown();
    let terminated = {
        let service = Arc::clone(&service);
        tokio::task::spawn_blocking(move || service.await_termination(Duration::from_secs(5)))
            .await??
    };
    if !terminated {
        warn!("worker did not stop in time");
    }
    println!("{}", serde_json::to_string_pretty(&service.stats())?);

    Ok(())
}
