#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// One canned response.
#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub location: Option<String>,
    pub delay: Duration,
}

impl Route {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into().into_bytes(),
            location: None,
            delay: Duration::ZERO,
        }
    }

    pub fn bytes(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
            location: None,
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: b"nope".to_vec(),
            location: None,
            delay: Duration::ZERO,
        }
    }

    pub fn redirect(to: impl Into<String>) -> Self {
        Self {
            status: 302,
            content_type: "text/plain",
            body: Vec::new(),
            location: Some(to.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// tiny_http server answering from a fixed route table, keyed by path plus
/// query. Unknown paths get a 404. Every request is counted.
pub struct StubServer {
    pub base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    pub fn start(routes: Vec<(&str, Route)>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let routes: HashMap<String, Route> = routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect();
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown, shutdown_rx) = mpsc::channel::<()>();

        let server_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(20)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                *server_hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                let route = routes.get(&path).cloned().unwrap_or_else(|| Route::status(404));
                if !route.delay.is_zero() {
                    thread::sleep(route.delay);
                }

                let mut response = tiny_http::Response::from_data(route.body)
                    .with_status_code(route.status)
                    .with_header(
                        tiny_http::Header::from_bytes(&b"Content-Type"[..], route.content_type.as_bytes())
                            .expect("build header"),
                    );
                if let Some(location) = route.location {
                    response = response.with_header(
                        tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes())
                            .expect("build header"),
                    );
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            hits,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One listing page with the given `(id, title, href, comments)` rows and an
/// optional next-page href.
pub fn listing_page(rows: &[(&str, &str, &str, u32)], next: Option<&str>) -> String {
    let mut html = String::from(r#"<html><body><table class="itemlist">"#);
    for (id, title, href, comments) in rows {
        html.push_str(&format!(
            r#"<tr class="athing submission" id="{id}">
  <td class="title"><span class="titleline"><a href="{href}">{title}</a></span></td>
</tr>
<tr><td class="subtext"><span class="subline">
  <span class="score">5 points</span> by <a href="user?id=u{id}" class="hnuser">u{id}</a>
  <span class="age" title="2026-01-05T12:00:00 1767614400"><a href="item?id={id}">1 hour ago</a></span>
  | <a href="item?id={id}">{comments}&nbsp;comments</a>
</span></td></tr>
"#
        ));
    }
    if let Some(next) = next {
        html.push_str(&format!(
            r#"<tr><td class="title"><a href="{next}" class="morelink" rel="next">More</a></td></tr>"#
        ));
    }
    html.push_str("</table></body></html>");
    html
}

/// Pipeline configuration for `data_dir` crawling `listing_urls`, with every
/// delay disabled.
pub fn pipeline_config(
    data_dir: &std::path::Path,
    listing_urls: &[String],
) -> show_directory::config::PipelineConfig {
    use clap::Parser as _;

    let mut argv: Vec<String> = vec![
        "show_directory".into(),
        "--data-dir".into(),
        data_dir.display().to_string(),
        "--listing-delay-ms".into(),
        "0".into(),
        "--fetch-delay-ms".into(),
        "0".into(),
        "--fetch-timeout-secs".into(),
        "5".into(),
        "--image-timeout-secs".into(),
        "5".into(),
        "--max-pages-per-url".into(),
        "2".into(),
    ];
    for url in listing_urls {
        argv.push("--listing-url".into());
        argv.push(url.clone());
    }
    argv.push("crawl".into());

    let cli = show_directory::cli::Cli::parse_from(argv);
    show_directory::config::PipelineConfig::from_args(&cli.global).expect("valid test config")
}
