use std::fs;
use std::io;
use std::path::Path;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, COOKIE, HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use super::probe::Mp3Probe;
use super::{DurationProbe, PartFetcher};
use crate::base_system::book_paths::{part_file_path, part_temp_path};
use crate::base_system::context::Config;

pub struct HttpFetcher {
    client: Client,
    cookie: Option<String>,
    probe: Mp3Probe,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        // 构建时未启用 gzip 解码，要求原样返回
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            cookie: None,
            probe: Mp3Probe,
        })
    }

    /// 附带浏览器会话里的 Cookie，部分音频地址需要登录态。
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        let cookie = cookie.into();
        self.cookie = (!cookie.trim().is_empty()).then_some(cookie);
        self
    }

    fn fetch_bytes(&self, url: &str) -> reqwest::Result<Vec<u8>> {
        let mut req = self.client.get(url);
        if let Some(cookie) = self.cookie.as_deref() {
            req = req.header(COOKIE, cookie);
        }
        let resp = req.send()?.error_for_status()?;
        Ok(resp.bytes()?.to_vec())
    }

    /// 先写临时文件再改名，中断的下载不会留下看似完整的分段。
    fn store(&self, bytes: &[u8], temp: &Path, dest: &Path) -> io::Result<()> {
        write_temp(bytes, temp)?;
        fs::rename(temp, dest)
    }
}

fn write_temp(bytes: &[u8], temp: &Path) -> io::Result<()> {
    if let Some(parent) = temp.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(temp, bytes)
}

impl PartFetcher for HttpFetcher {
    fn fetch_part(&mut self, url: &str, dest_dir: &Path, part_num: u32) -> u32 {
        if url.trim().is_empty() {
            return 0;
        }
        let dest = part_file_path(dest_dir, part_num);
        let temp = part_temp_path(dest_dir, part_num);

        let bytes = match self.fetch_bytes(url) {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => {
                warn!(target: "fetch", part_num, "分段响应为空");
                return 0;
            }
            Err(e) => {
                warn!(target: "fetch", part_num, error = %e, "分段下载失败");
                return 0;
            }
        };
        if let Err(e) = write_temp(&bytes, &temp) {
            warn!(target: "fetch", part_num, path = %temp.display(), error = %e, "分段写入失败");
            let _ = fs::remove_file(&temp);
            return 0;
        }

        // 临时文件测量通过后才改名，失败的下载不会留下 partNN.mp3
        let secs = match self.probe.measure(&temp) {
            Ok(secs) if secs.floor() >= 1.0 => secs,
            Ok(secs) => {
                warn!(target: "fetch", part_num, secs, "分段时长为 0");
                let _ = fs::remove_file(&temp);
                return 0;
            }
            Err(e) => {
                warn!(target: "fetch", part_num, error = %e, "无法解析分段时长");
                let _ = fs::remove_file(&temp);
                return 0;
            }
        };
        if let Err(e) = fs::rename(&temp, &dest) {
            warn!(target: "fetch", part_num, path = %dest.display(), error = %e, "分段改名失败");
            let _ = fs::remove_file(&temp);
            return 0;
        }
        info!(target: "fetch", part_num, bytes = bytes.len(), secs, "分段已下载");
        secs.floor() as u32
    }

    fn fetch_cover(&mut self, url: &str, dest: &Path) -> bool {
        let bytes = match self.fetch_bytes(url) {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => return false,
            Err(e) => {
                debug!(target: "fetch", error = %e, "封面下载失败");
                return false;
            }
        };
        let temp = dest.with_extension("jpg.tmp");
        match self.store(&bytes, &temp, dest) {
            Ok(()) => true,
            Err(e) => {
                debug!(target: "fetch", path = %dest.display(), error = %e, "封面写入失败");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::probe::tests::frames;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// 本地单次 HTTP 服务，返回 200 和给定内容。
    fn serve_once(body: Vec<u8>) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 4096];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).expect("read request");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).expect("write head");
            stream.write_all(&body).expect("write body");
        });
        (format!("http://{addr}/odm/Book-Part01.mp3"), handle)
    }

    #[test]
    fn empty_url_is_a_failed_fetch() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut fetcher = HttpFetcher::new(&Config::default()).expect("client");
        assert_eq!(fetcher.fetch_part("  ", dir.path(), 1), 0);
        assert!(!part_file_path(dir.path(), 1).exists());
    }

    #[test]
    fn html_body_leaves_no_part_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (url, server) = serve_once(b"<html>session expired</html>".to_vec());
        let mut fetcher = HttpFetcher::new(&Config::default()).expect("client");

        assert_eq!(fetcher.fetch_part(&url, dir.path(), 1), 0);
        server.join().expect("server");
        assert!(!part_file_path(dir.path(), 1).exists());
        assert!(!part_temp_path(dir.path(), 1).exists());
    }

    #[test]
    fn audio_body_is_renamed_into_place() {
        let dir = tempfile::tempdir().expect("temp dir");
        // 约 2.6 秒
        let (url, server) = serve_once(frames(100));
        let mut fetcher = HttpFetcher::new(&Config::default()).expect("client");

        assert_eq!(fetcher.fetch_part(&url, dir.path(), 1), 2);
        server.join().expect("server");
        assert!(part_file_path(dir.path(), 1).exists());
        assert!(!part_temp_path(dir.path(), 1).exists());
    }

    #[test]
    fn blank_cookie_is_ignored() {
        let fetcher = HttpFetcher::new(&Config::default())
            .expect("client")
            .with_cookie(" ");
        assert!(fetcher.cookie.is_none());
    }
}
