use std::collections::HashMap;
use std::path::Path;
use std::process::Output;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::process::Command;

/// Serve `routes` (request target → status and body) on an ephemeral port.
///
/// Unknown targets answer 404. Returns the base URL.
pub async fn serve(routes: HashMap<String, (u16, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 2048];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = routes
                    .get(&target)
                    .cloned()
                    .unwrap_or((404, "not found".to_string()));
                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    concat!(
                        "HTTP/1.1 {status} {reason}\r\n",
                        "Content-Type: text/html; charset=utf-8\r\n",
                        "Content-Length: {len}\r\n",
                        "Connection: close\r\n\r\n",
                        "{body}",
                    ),
                    status = status,
                    reason = reason,
                    len = body.len(),
                    body = body,
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// A store page opened on a product detail modal.
pub fn product_page(name: &str, price_label: &str) -> String {
    format!(
        r#"<html><body>
          <div data-qa="modal-body">
            <img src="https://images.example.com/{name}.png">
            <h2 data-qa="modal-name">{name}</h2>
            <div data-testid="product-info"><p>Hecho en el día.</p></div>
            <span data-testid="price">{price_label}</span>
            <ul data-qa="topping-list">
              <li data-qa="topping-item">
                <span data-testid="typography">Extra queso</span>
                <span data-testid="typography">+ $ 500</span>
              </li>
            </ul>
          </div>
        </body></html>"#
    )
}

/// A category listing page with one card per `(href, name)`.
pub fn listing_page(stores: &[(&str, &str)]) -> String {
    let cards: String = stores
        .iter()
        .map(|(href, name)| {
            format!(
                r#"<a data-qa="store-item-restaurant-x" href="{href}">
                     <h3>{name}</h3>
                     <span data-testid="typography">4.5</span>
                     <span data-testid="typography">20-30 min</span>
                   </a>"#
            )
        })
        .collect();
    format!("<html><body>{cards}</body></html>")
}

/// Run the `harvest` binary in `dir` with a clean environment.
pub async fn harvest(dir: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_harvest"));
    command.args(args).current_dir(dir).env("NO_PROXY", "127.0.0.1,localhost");
    for var in [
        "HTTP_PROXY",
        "HTTPS_PROXY",
        "ALL_PROXY",
        "http_proxy",
        "https_proxy",
        "all_proxy",
        "HARVEST_CONCURRENCY",
        "HARVEST_WORKERS",
        "HARVEST_STAGING_DIR",
        "HARVEST_FETCH_TIMEOUT_SECS",
        "HARVEST_USER_AGENT",
        "HARVEST_LOCK_TIMEOUT_SECS",
    ] {
        command.env_remove(var);
    }
    command.output().await.unwrap()
}

pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "harvest failed: {}\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

pub fn read_json(path: &Path) -> Vec<Value> {
    let contents = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&contents).unwrap()
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}
