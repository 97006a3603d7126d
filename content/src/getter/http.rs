//! Files served over http(s).

use std::sync::OnceLock;

use hauler_core::error::{HaulerError, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use super::{source_config, Cancellable, Getter, GetterKind, SourceUrl};
use crate::config::Config;
use crate::consts;
use crate::layer::ReadStream;

/// Serves `http://` and `https://` sources.
#[derive(Debug, Default)]
pub struct HttpGetter {
    client: OnceLock<HttpClient>,
}

impl HttpGetter {
    pub fn new() -> Self {
        Self::default()
    }

    // Built on first use: constructing a blocking client spins up a thread.
    fn client(&self) -> &HttpClient {
        self.client.get_or_init(HttpClient::new)
    }
}

impl Getter for HttpGetter {
    fn kind(&self) -> GetterKind {
        GetterKind::Http
    }

    fn detect(&self, source: &SourceUrl) -> bool {
        matches!(source.scheme(), "http" | "https")
    }

    /// Name from `Content-Disposition` when the server sends one, else the
    /// last path segment of the URL.
    fn name(&self, source: &SourceUrl) -> Result<String> {
        let url = source.url().ok_or_else(|| HaulerError::SourceNotFound {
            source_ref: source.as_str().to_string(),
        })?;

        match self.client().head(url.clone()).send() {
            Ok(resp) => {
                let disposition = resp
                    .headers()
                    .get(CONTENT_DISPOSITION)
                    .and_then(|v| v.to_str().ok());
                if let Some(name) = disposition.and_then(filename_from_disposition) {
                    return Ok(name);
                }
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "HEAD failed, naming from URL path");
            }
        }

        let segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty());
        match segment.or(url.host_str()) {
            Some(name) => Ok(name.to_string()),
            None => Err(HaulerError::Parse(format!("no file name in '{}'", url))),
        }
    }

    fn open(&self, cancel: &CancellationToken, source: &SourceUrl) -> Result<ReadStream> {
        if cancel.is_cancelled() {
            return Err(HaulerError::Cancelled);
        }
        let url = source.url().ok_or_else(|| HaulerError::SourceNotFound {
            source_ref: source.as_str().to_string(),
        })?;

        let resp = self.client().get(url.clone()).send().map_err(|e| {
            HaulerError::io(format!("GET {}", url), std::io::Error::other(e))
        })?;

        match resp.status() {
            status if status.is_success() => {
                tracing::debug!(url = %url, status = %status, "Opened http source");
                Ok(Box::new(Cancellable::new(resp, cancel.clone())))
            }
            StatusCode::NOT_FOUND => Err(HaulerError::SourceNotFound {
                source_ref: source.as_str().to_string(),
            }),
            status => Err(HaulerError::io(
                format!("GET {}", url),
                std::io::Error::other(format!("unexpected status {}", status)),
            )),
        }
    }

    fn config(&self, source: &SourceUrl) -> Result<Config> {
        source_config(source, consts::FILE_HTTP_CONFIG_MEDIA_TYPE)
    }
}

/// Extract `filename` from a `Content-Disposition` header value.
fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| {
            let (key, val) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("filename")
                .then(|| val.trim().trim_matches('"').to_string())
        })
        .filter(|name| !name.is_empty() && !name.contains('/') && !name.contains('\\'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    /// Serve one canned response per connection, in order.
    fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                }
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        format!("http://{}", addr)
    }

    fn response(status: &str, headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
            status,
            body.len(),
            headers,
            body
        )
    }

    #[test]
    fn test_detect_schemes() {
        let getter = HttpGetter::new();
        assert!(getter.detect(&SourceUrl::parse("http://example.com/a").unwrap()));
        assert!(getter.detect(&SourceUrl::parse("https://example.com/a").unwrap()));
        assert!(!getter.detect(&SourceUrl::parse("ftp://example.com/a").unwrap()));
        assert!(!getter.detect(&SourceUrl::parse("/tmp/a").unwrap()));
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="k3s.tar.gz""#),
            Some("k3s.tar.gz".to_string())
        );
        assert_eq!(
            filename_from_disposition("attachment; FILENAME=plain.txt"),
            Some("plain.txt".to_string())
        );
        assert_eq!(filename_from_disposition("inline"), None);
        assert_eq!(filename_from_disposition(r#"attachment; filename="../x""#), None);
    }

    #[test]
    fn test_name_from_content_disposition() {
        let base = serve(vec![response(
            "200 OK",
            "Content-Disposition: attachment; filename=\"install.sh\"\r\n",
            "",
        )]);
        let source = SourceUrl::parse(&format!("{}/download?id=7", base)).unwrap();
        assert_eq!(HttpGetter::new().name(&source).unwrap(), "install.sh");
    }

    #[test]
    fn test_name_falls_back_to_path() {
        let base = serve(vec![response("200 OK", "", "")]);
        let source = SourceUrl::parse(&format!("{}/releases/k3s-airgap.tar", base)).unwrap();
        assert_eq!(HttpGetter::new().name(&source).unwrap(), "k3s-airgap.tar");
    }

    #[test]
    fn test_open_streams_body() {
        let base = serve(vec![response("200 OK", "", "remote bytes")]);
        let source = SourceUrl::parse(&format!("{}/file.txt", base)).unwrap();
        let mut body = String::new();
        HttpGetter::new()
            .open(&CancellationToken::new(), &source)
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "remote bytes");
    }

    #[test]
    fn test_open_not_found() {
        let base = serve(vec![response("404 Not Found", "", "")]);
        let source = SourceUrl::parse(&format!("{}/missing.txt", base)).unwrap();
        assert!(matches!(
            HttpGetter::new().open(&CancellationToken::new(), &source),
            Err(HaulerError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn test_config_media_type() {
        let source = SourceUrl::parse("https://example.com/a.txt").unwrap();
        let config = HttpGetter::new().config(&source).unwrap();
        assert_eq!(config.media_type(), consts::FILE_HTTP_CONFIG_MEDIA_TYPE);
    }
}
