//! In-memory control plane for tests
//!
//! Implements just enough of the command set (HELLO, AUTH, SELECT, PING,
//! INFO, GET, SET, DEL, SCAN, FLUSHDB, DBSIZE) to exercise sessions,
//! scans and batched deletes without a server.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::time::Duration;

use super::control_plane::ControlPlane;
use crate::utils::RespValue;

pub struct InMemoryControlPlane {
    data: BTreeMap<String, String>,
    binary_keys: Vec<Vec<u8>>,
    password: Option<String>,
    authenticated: bool,
    hello_supported: bool,
    scan_page_size: Option<usize>,
    scan_duplicates: bool,
    failing_commands: HashSet<String>,
    fail_del_call: Option<usize>,
    del_calls: usize,
    del_batches: Vec<usize>,
    commands: Vec<Vec<String>>,
    io_timeouts: Vec<Option<Duration>>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            binary_keys: Vec::new(),
            password: None,
            authenticated: true,
            hello_supported: true,
            scan_page_size: None,
            scan_duplicates: false,
            failing_commands: HashSet::new(),
            fail_del_call: None,
            del_calls: 0,
            del_batches: Vec::new(),
            commands: Vec::new(),
            io_timeouts: Vec::new(),
        }
    }

    pub fn with_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            let key = key.into();
            self.data.insert(key.clone(), format!("value-of-{}", key));
        }
        self
    }

    /// Keys that are not valid UTF-8; SCAN returns them on its first page
    pub fn with_binary_keys<I: IntoIterator<Item = Vec<u8>>>(mut self, keys: I) -> Self {
        self.binary_keys.extend(keys);
        self
    }

    /// Require AUTH (or HELLO AUTH) before any other command
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self.authenticated = false;
        self
    }

    /// Behave like a pre-6.0 server
    pub fn without_hello(mut self) -> Self {
        self.hello_supported = false;
        self
    }

    /// Fixed SCAN page size regardless of COUNT
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = Some(size);
        self
    }

    /// Repeat the last key of each page at the start of the next one
    pub fn with_scan_duplicates(mut self) -> Self {
        self.scan_duplicates = true;
        self
    }

    /// Every call of `command` returns a server error
    pub fn fail_command(&mut self, command: &str) {
        self.failing_commands.insert(command.to_ascii_uppercase());
    }

    pub fn clear_failures(&mut self) {
        self.failing_commands.clear();
        self.fail_del_call = None;
    }

    /// The n-th (1-based) DEL call fails at the transport level
    pub fn fail_del_call(mut self, call: usize) -> Self {
        self.fail_del_call = Some(call);
        self
    }

    pub fn commands(&self) -> &[Vec<String>] {
        &self.commands
    }

    /// Number of keys sent with each DEL call, in order
    pub fn del_batches(&self) -> &[usize] {
        &self.del_batches
    }

    /// Every timeout passed to `set_io_timeout`, in order
    pub fn io_timeouts(&self) -> &[Option<Duration>] {
        &self.io_timeouts
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    fn ok() -> RespValue {
        RespValue::SimpleString("OK".to_string())
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::BulkString(s.as_bytes().to_vec())
    }

    fn scan(&self, args: &[&str]) -> RespValue {
        let cursor: usize = match args.get(1).and_then(|c| c.parse().ok()) {
            Some(c) => c,
            None => return RespValue::Error("ERR invalid cursor".to_string()),
        };
        let mut pattern = "*";
        let mut count = 10usize;
        let mut i = 2;
        while i + 1 < args.len() {
            match args[i].to_ascii_uppercase().as_str() {
                "MATCH" => pattern = args[i + 1],
                "COUNT" => count = args[i + 1].parse().unwrap_or(10),
                _ => {}
            }
            i += 2;
        }
        let page = self.scan_page_size.unwrap_or(count).max(1);

        let keys: Vec<&String> = self.data.keys().collect();
        let start = if self.scan_duplicates && cursor > 0 {
            cursor - 1
        } else {
            cursor
        };
        let end = (cursor + page).min(keys.len());
        let mut matched: Vec<RespValue> = keys
            .get(start.min(end)..end)
            .unwrap_or_default()
            .iter()
            .filter(|k| glob_match(pattern, k))
            .map(|k| Self::bulk(k))
            .collect();
        if cursor == 0 {
            matched.extend(self.binary_keys.iter().cloned().map(RespValue::BulkString));
        }
        let next = if end >= keys.len() { 0 } else { end };

        RespValue::Array(vec![
            Self::bulk(&next.to_string()),
            RespValue::Array(matched),
        ])
    }
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlane for InMemoryControlPlane {
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue> {
        self.commands
            .push(args.iter().map(|s| s.to_string()).collect());

        let command = args
            .first()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or_default();

        if self.failing_commands.contains(&command) {
            return Ok(RespValue::Error(format!("ERR injected {} failure", command)));
        }

        match command.as_str() {
            "HELLO" => {
                if !self.hello_supported {
                    return Ok(RespValue::Error(
                        "ERR unknown command 'HELLO', with args beginning with: '3'".to_string(),
                    ));
                }
                if args.len() >= 5 && args[2].eq_ignore_ascii_case("AUTH") {
                    if self.password.as_deref() == Some(args[4]) || self.password.is_none() {
                        self.authenticated = true;
                    } else {
                        return Ok(RespValue::Error(
                            "WRONGPASS invalid username-password pair or user is disabled."
                                .to_string(),
                        ));
                    }
                }
                if !self.authenticated {
                    return Ok(RespValue::Error(
                        "NOAUTH HELLO must be called with the client already authenticated"
                            .to_string(),
                    ));
                }
                return Ok(RespValue::Map(vec![
                    (Self::bulk("server"), Self::bulk("redis")),
                    (Self::bulk("proto"), RespValue::Integer(3)),
                ]));
            }
            "AUTH" => {
                let given = args.last().copied();
                if args.len() >= 2 && self.password.as_deref() == given {
                    self.authenticated = true;
                    return Ok(Self::ok());
                }
                return Ok(RespValue::Error(
                    "WRONGPASS invalid username-password pair or user is disabled.".to_string(),
                ));
            }
            _ => {}
        }

        if !self.authenticated {
            return Ok(RespValue::Error("NOAUTH Authentication required.".to_string()));
        }

        let reply = match command.as_str() {
            "PING" => RespValue::SimpleString("PONG".to_string()),
            "SELECT" => Self::ok(),
            "INFO" => RespValue::BulkString(
                b"# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n".to_vec(),
            ),
            "GET" => match args.get(1).and_then(|k| self.data.get(*k)) {
                Some(v) => Self::bulk(v),
                None => RespValue::Null,
            },
            "SET" if args.len() == 3 => {
                self.data.insert(args[1].to_string(), args[2].to_string());
                Self::ok()
            }
            "DEL" => {
                self.del_calls += 1;
                if self.fail_del_call == Some(self.del_calls) {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    ));
                }
                self.del_batches.push(args.len() - 1);
                let removed = args[1..]
                    .iter()
                    .filter(|k| self.data.remove(**k).is_some())
                    .count();
                RespValue::Integer(removed as i64)
            }
            "SCAN" => self.scan(args),
            "FLUSHDB" => {
                self.data.clear();
                Self::ok()
            }
            "DBSIZE" => RespValue::Integer(self.data.len() as i64),
            _ => RespValue::Error(format!("ERR unknown command '{}'", command)),
        };
        Ok(reply)
    }

    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.io_timeouts.push(timeout);
        Ok(())
    }
}

/// Glob matching with `*` and `?`, enough for the fake's SCAN MATCH
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("user:*", "user:1"));
        assert!(!glob_match("user:*", "order:1"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("*:1", "order:1"));
        assert!(!glob_match("a?c", "ac"));
    }

    #[test]
    fn test_scan_walks_all_pages() {
        let mut plane = InMemoryControlPlane::new()
            .with_keys(["a", "b", "c", "d", "e"])
            .with_scan_page_size(2);
        let mut cursor = "0".to_string();
        let mut seen = 0;
        loop {
            let reply = plane.execute(&["SCAN", &cursor, "MATCH", "*"]).unwrap();
            let parts = reply.as_array().unwrap().to_vec();
            cursor = parts[0].as_str().unwrap().to_string();
            seen += parts[1].as_array().unwrap().len();
            if cursor == "0" {
                break;
            }
        }
        assert_eq!(seen, 5);
    }
}
