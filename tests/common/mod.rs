// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use npmkit::hash::sha256;
use npmkit::portable::{ArchiveFetcher, ArchiveFormat, DistTarget};
use npmkit::{Error, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Linux x64 target using gzip so tests need no xz encoder
pub fn test_target() -> DistTarget {
    DistTarget {
        os: "linux".to_string(),
        arch: "x64".to_string(),
        format: ArchiveFormat::TarGz,
    }
}

/// Build a `.tar.gz` in memory from (path, contents, mode) entries
pub fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    for (path, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A distribution archive shaped like the official one for `version`
pub fn node_distribution(version: &str) -> Vec<u8> {
    let stem = test_target().stem(version);
    let node = format!("{}/bin/node", stem);
    let npm = format!("{}/bin/npm", stem);
    let license = format!("{}/LICENSE", stem);
    tar_gz(&[
        (node.as_str(), b"#!/bin/sh\necho v0.0.0\n".as_slice(), 0o755),
        (npm.as_str(), b"#!/bin/sh\necho 0.0.0\n".as_slice(), 0o755),
        (license.as_str(), b"MIT".as_slice(), 0o644),
    ])
}

/// `SHASUMS256.txt` listing `file_name` with the digest of `data`
pub fn shasums_for(file_name: &str, data: &[u8]) -> String {
    format!("{}  {}\n", sha256(data), file_name)
}

/// In-memory [`ArchiveFetcher`] keyed by URL, counting downloads
#[derive(Clone, Default)]
pub struct FakeFetcher {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    downloads: Arc<AtomicUsize>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(url.into(), body.into());
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl ArchiveFetcher for FakeFetcher {
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap();
        let body = files
            .get(url)
            .ok_or_else(|| Error::DownloadError(format!("HTTP 404 Not Found from {}", url)))?;
        dest.write_all(body)?;
        Ok(body.len() as u64)
    }

    fn fetch_text(&self, url: &str) -> Result<Option<String>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .get(url)
            .map(|body| String::from_utf8_lossy(body).into_owned()))
    }
}

/// Minimal HTTP/1.1 server answering GETs from a fixed path table
///
/// Serves until the test process exits. Unknown paths get 404.
pub struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn start(routes: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                counter.fetch_add(1, Ordering::SeqCst);

                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) | Err(_) => break,
                        Ok(_) if header == "\r\n" => break,
                        Ok(_) => {}
                    }
                }

                let path = request_line.split_whitespace().nth(1).unwrap_or("/");
                let response = match routes.get(path) {
                    Some(body) => {
                        let mut out = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        out.extend_from_slice(body);
                        out
                    }
                    None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_vec(),
                };
                let _ = stream.write_all(&response);
                let _ = stream.flush();
            }
        });

        Self { base_url, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
