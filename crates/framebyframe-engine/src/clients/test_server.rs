//! A scripted loopback HTTP server for client tests.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;

use serde_json::Value;

/// A received request: its request line and JSON body.
pub(crate) type Received = (String, Value);

/// Answers one request per entry of `replies`, in order, with that status
/// line and JSON body. Joining the handle yields what was received.
pub(crate) fn serve(
    replies: Vec<(&'static str, &'static str)>,
) -> anyhow::Result<(String, thread::JoinHandle<Vec<Received>>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let base = format!("http://{}", listener.local_addr()?);
    let handle = thread::spawn(move || {
        let mut received = Vec::new();
        for (status, body) in replies {
            let Ok((stream, _)) = listener.accept() else {
                break;
            };
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            let _ = reader.read_line(&mut request_line);
            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap_or(0) == 0 || header == "\r\n" {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut raw_body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut raw_body);
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let mut stream = reader.into_inner();
            let _ = stream.write_all(response.as_bytes());
            let parsed = serde_json::from_slice(&raw_body).unwrap_or(Value::Null);
            received.push((request_line.trim().to_string(), parsed));
        }
        received
    });
    Ok((base, handle))
}

pub(crate) fn loopback_http() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder().no_proxy().build()?)
}
