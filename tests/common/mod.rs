//! Shared helpers for integration tests: a local asset server and
//! synthetic archives.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

/// HTTP server answering GET requests from a fixed path → body table and
/// counting requests per path. Unknown paths get a 404.
pub struct AssetServer {
    pub url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl AssetServer {
    pub fn start(routes: Vec<(String, Vec<u8>)>) -> Self {
        Self::start_truncating(routes, &[])
    }

    /// Like [`AssetServer::start`], but the paths in `truncated` advertise
    /// twice their body length and hang up after the body.
    pub fn start_truncating(routes: Vec<(String, Vec<u8>)>, truncated: &[&str]) -> Self {
        let truncated: Vec<String> = truncated.iter().map(|p| p.to_string()).collect();
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let url = format!("http://{}", listener.local_addr().unwrap());
        let routes: HashMap<String, Vec<u8>> = routes.into_iter().collect();
        let hits = Arc::new(Mutex::new(HashMap::new()));

        let hits_bg = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let path = read_request_path(&mut stream);
                *hits_bg.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                let response: Vec<u8> = match routes.get(&path) {
                    Some(body) => {
                        let advertised = if truncated.contains(&path) {
                            body.len() * 2
                        } else {
                            body.len()
                        };
                        let mut r = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {advertised}\r\nConnection: close\r\n\r\n"
                        )
                        .into_bytes();
                        r.extend_from_slice(body);
                        r
                    }
                    None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_vec(),
                };
                let _ = stream.write_all(&response);
                let _ = stream.flush();
            }
        });

        Self { url, hits }
    }

    /// Number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

fn read_request_path(stream: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).unwrap_or(0);
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&request)
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string()
}

/// Builds an in-memory zip. `mode` of `None` leaves the writer's default.
pub fn zip_bytes(entries: &[(&str, Option<u32>, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, mode, content) in entries {
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        let options = match mode {
            Some(mode) => options.unix_permissions(*mode),
            None => options,
        };
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Writes an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    {
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(format!("#!/bin/sh\n{body}\n").as_bytes())
            .unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Non-empty lines of a text file.
pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
