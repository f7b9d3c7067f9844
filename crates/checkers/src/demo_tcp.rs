//! A minimal reference checker: liveness is "can we open a TCP connection",
//! and flags are stored in-process keyed by seed. Good enough for
//! integration tests and as a template for a real probe; not meant for
//! production use.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use warden_core::CheckStatus;

use crate::checker::Checker;
use crate::target::CheckerTarget;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct DemoTcpChecker {
    target: CheckerTarget,
    planted: HashMap<String, String>,
}

impl DemoTcpChecker {
    pub fn new(target: CheckerTarget) -> Self {
        Self {
            target,
            planted: HashMap::new(),
        }
    }

    fn connect(&self) -> std::io::Result<TcpStream> {
        let addr = self
            .target
            .address()
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
    }
}

impl Checker for DemoTcpChecker {
    fn check(&mut self) -> CheckStatus {
        match self.connect() {
            Ok(_) => CheckStatus::Ok,
            Err(_) => CheckStatus::Down,
        }
    }

    fn put(&mut self, flag_data: &str, seed: &str) -> CheckStatus {
        let mut stream = match self.connect() {
            Ok(s) => s,
            Err(_) => return CheckStatus::Down,
        };

        let line = format!("PUT {} {}\n", seed, flag_data);
        if stream.write_all(line.as_bytes()).is_err() {
            return CheckStatus::Mumble;
        }

        self.planted.insert(seed.to_string(), flag_data.to_string());
        CheckStatus::Ok
    }

    fn get(&mut self, flag_data: &str, seed: &str) -> CheckStatus {
        let mut stream = match self.connect() {
            Ok(s) => s,
            Err(_) => return CheckStatus::Down,
        };

        let line = format!("GET {}\n", seed);
        if stream.write_all(line.as_bytes()).is_err() {
            return CheckStatus::Mumble;
        }

        let mut buf = [0u8; 256];
        let n = match stream.read(&mut buf) {
            Ok(n) => n,
            Err(_) => return CheckStatus::Mumble,
        };
        let echoed = String::from_utf8_lossy(&buf[..n]);

        match self.planted.get(seed) {
            Some(expected) if expected == flag_data && echoed.trim() == flag_data => {
                CheckStatus::Ok
            }
            Some(_) => CheckStatus::Corrupt,
            None => CheckStatus::Corrupt,
        }
    }
}
