//! Plain HTTP GET framing
//!
//! The frame only ever issues `GET` requests for one image over plain
//! HTTP. Requests are HTTP/1.0 with `Connection: close`, so responses are
//! never chunked and the body ends when the server closes the connection.

/// Port used when the URL names none
pub const DEFAULT_PORT: u16 = 80;

/// Longest response head accepted (status line plus headers)
pub const MAX_HEAD_LEN: usize = 1024;

const HEAD_END: &[u8] = b"\r\n\r\n";

/// HTTP framing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttpError {
    /// URL is not `http://`
    UnsupportedScheme,
    /// Host or port is missing or malformed
    InvalidUrl,
    /// Request does not fit the buffer
    BufferTooSmall,
    /// No blank line within [`MAX_HEAD_LEN`] bytes
    HeadTooLarge,
    /// Status line is not `HTTP/1.x NNN ...`
    MalformedStatus,
}

/// Parsed `http://host[:port]/path` URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Url<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Path and query, always starting with `/`
    pub path: &'a str,
}

impl<'a> Url<'a> {
    pub fn parse(url: &'a str) -> Result<Self, HttpError> {
        let rest = url
            .strip_prefix("http://")
            .ok_or(HttpError::UnsupportedScheme)?;

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if authority.contains('@') {
            return Err(HttpError::InvalidUrl);
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| HttpError::InvalidUrl)?),
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() || port == 0 {
            return Err(HttpError::InvalidUrl);
        }

        Ok(Self { host, port, path })
    }
}

/// Encode the GET request for `url`
///
/// Returns the number of bytes written
pub fn encode_get(url: &Url<'_>, buffer: &mut [u8]) -> Result<usize, HttpError> {
    let mut out = Cursor { buf: buffer, pos: 0 };
    out.put(b"GET ")?;
    out.put(url.path.as_bytes())?;
    out.put(b" HTTP/1.0\r\nHost: ")?;
    out.put(url.host.as_bytes())?;
    if url.port != DEFAULT_PORT {
        let mut digits = [0u8; 5];
        out.put(b":")?;
        out.put(format_port(url.port, &mut digits))?;
    }
    out.put(b"\r\nUser-Agent: inkframe\r\nAccept: image/bmp\r\nConnection: close\r\n\r\n")?;
    Ok(out.pos)
}

fn format_port(mut port: u16, digits: &mut [u8; 5]) -> &[u8] {
    let mut start = digits.len();
    loop {
        start -= 1;
        digits[start] = b'0' + (port % 10) as u8;
        port /= 10;
        if port == 0 {
            return &digits[start..];
        }
    }
}

struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn put(&mut self, data: &[u8]) -> Result<(), HttpError> {
        let end = self.pos + data.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(HttpError::BufferTooSmall)?
            .copy_from_slice(data);
        self.pos = end;
        Ok(())
    }
}

/// Status line and the headers the frame cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseHead {
    pub status: u16,
    pub content_length: Option<u32>,
}

impl ResponseHead {
    /// Parse a response head from the start of `buf`
    ///
    /// Returns `Ok(None)` until the blank line ending the head has arrived,
    /// then the head and the offset of the first body byte.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, HttpError> {
        let Some(end) = buf.windows(HEAD_END.len()).position(|w| w == HEAD_END) else {
            if buf.len() >= MAX_HEAD_LEN {
                return Err(HttpError::HeadTooLarge);
            }
            return Ok(None);
        };
        if end + HEAD_END.len() > MAX_HEAD_LEN {
            return Err(HttpError::HeadTooLarge);
        }

        let mut lines = buf[..end].split(|b| *b == b'\n').map(trim_cr);
        let status = parse_status_line(lines.next().unwrap_or_default())?;

        let mut content_length = None;
        for line in lines {
            let Some(colon) = line.iter().position(|b| *b == b':') else {
                continue;
            };
            let (name, value) = (&line[..colon], &line[colon + 1..]);
            if name.eq_ignore_ascii_case(b"content-length") {
                content_length = core::str::from_utf8(value)
                    .ok()
                    .and_then(|v| v.trim().parse().ok());
            }
        }

        Ok(Some((
            Self {
                status,
                content_length,
            },
            end + HEAD_END.len(),
        )))
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_status_line(line: &[u8]) -> Result<u16, HttpError> {
    let mut parts = line.split(|b| *b == b' ').filter(|p| !p.is_empty());
    let version = parts.next().ok_or(HttpError::MalformedStatus)?;
    if !version.starts_with(b"HTTP/1.") {
        return Err(HttpError::MalformedStatus);
    }

    let code = parts.next().ok_or(HttpError::MalformedStatus)?;
    if code.len() != 3 || !code.iter().all(u8::is_ascii_digit) {
        return Err(HttpError::MalformedStatus);
    }
    Ok(code.iter().fold(0u16, |acc, d| acc * 10 + (d - b'0') as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        let url = Url::parse("http://frames.local:8080/render/kitchen.bmp?v=2").unwrap();
        assert_eq!(url.host, "frames.local");
        assert_eq!(url.port, 8080);
        assert_eq!(url.path, "/render/kitchen.bmp?v=2");

        let url = Url::parse("http://192.168.1.20").unwrap();
        assert_eq!(url.host, "192.168.1.20");
        assert_eq!(url.port, 80);
        assert_eq!(url.path, "/");
    }

    #[test]
    fn test_reject_urls() {
        assert_eq!(Url::parse("https://x/a.bmp"), Err(HttpError::UnsupportedScheme));
        assert_eq!(Url::parse("ftp://x/a.bmp"), Err(HttpError::UnsupportedScheme));
        assert_eq!(Url::parse("http:///a.bmp"), Err(HttpError::InvalidUrl));
        assert_eq!(Url::parse("http://x:http/a.bmp"), Err(HttpError::InvalidUrl));
        assert_eq!(Url::parse("http://x:0/"), Err(HttpError::InvalidUrl));
        assert_eq!(Url::parse("http://user@x/"), Err(HttpError::InvalidUrl));
    }

    #[test]
    fn test_encode_get() {
        let url = Url::parse("http://img.lan/a.bmp").unwrap();
        let mut buf = [0u8; 256];
        let n = encode_get(&url, &mut buf).unwrap();
        let text = core::str::from_utf8(&buf[..n]).unwrap();

        assert!(text.starts_with("GET /a.bmp HTTP/1.0\r\nHost: img.lan\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_encode_get_with_port() {
        let url = Url::parse("http://img.lan:8123/a.bmp").unwrap();
        let mut buf = [0u8; 256];
        let n = encode_get(&url, &mut buf).unwrap();

        assert!(core::str::from_utf8(&buf[..n]).unwrap().contains("Host: img.lan:8123\r\n"));
    }

    #[test]
    fn test_encode_get_small_buffer() {
        let url = Url::parse("http://img.lan/a.bmp").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(encode_get(&url, &mut buf), Err(HttpError::BufferTooSmall));
    }

    #[test]
    fn test_parse_head() {
        let response =
            b"HTTP/1.1 200 OK\r\nContent-Type: image/bmp\r\ncontent-length: 1234\r\n\r\nBM";
        let (head, body) = ResponseHead::parse(response).unwrap().unwrap();

        assert_eq!(head.status, 200);
        assert_eq!(head.content_length, Some(1234));
        assert_eq!(&response[body..], b"BM");
    }

    #[test]
    fn test_parse_head_without_length() {
        let (head, body) = ResponseHead::parse(b"HTTP/1.0 404 Not Found\r\n\r\n").unwrap().unwrap();

        assert_eq!(head.status, 404);
        assert_eq!(head.content_length, None);
        assert_eq!(body, 26);
    }

    #[test]
    fn test_partial_head() {
        assert_eq!(ResponseHead::parse(b"HTTP/1.1 200 OK\r\nContent-"), Ok(None));
    }

    #[test]
    fn test_head_too_large() {
        let mut response = std::vec::Vec::from(&b"HTTP/1.1 200 OK\r\n"[..]);
        response.resize(MAX_HEAD_LEN, b'a');

        assert_eq!(ResponseHead::parse(&response), Err(HttpError::HeadTooLarge));
    }

    #[test]
    fn test_malformed_status() {
        assert_eq!(ResponseHead::parse(b"SSH-2.0\r\n\r\n"), Err(HttpError::MalformedStatus));
        assert_eq!(ResponseHead::parse(b"HTTP/1.1 OK\r\n\r\n"), Err(HttpError::MalformedStatus));
        assert_eq!(
            ResponseHead::parse(b"HTTP/1.1 2000 OK\r\n\r\n"),
            Err(HttpError::MalformedStatus)
        );
    }
}
