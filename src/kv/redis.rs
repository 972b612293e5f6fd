//! Blocking RESP2 client for a networked key-value backend.

use super::resp::{encode_command, read_reply, Reply};
use super::KvStore;
use crate::error::{StoreFault, StoreResult};
use parking_lot::Mutex;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection parameters for [`RedisStore`].
#[derive(Clone, Debug)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database selected after connecting.
    pub database: i64,
    pub connect_timeout: Duration,
    /// Read/write timeout on the socket; `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            database: 0,
            connect_timeout: Duration::from_secs(5),
            io_timeout: None,
        }
    }
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn round_trip(&mut self, args: &[&[u8]]) -> StoreResult<Reply> {
        self.writer.write_all(&encode_command(args))?;
        self.writer.flush()?;
        read_reply(&mut self.reader)
    }
}

/// A single shared connection to the backend.
///
/// Commands are serialized over the connection; each one is atomic on the
/// server. The connection is opened on first use and reopened on the call
/// after a transport or framing failure. Failed calls are never retried.
pub struct RedisStore {
    settings: RedisSettings,
    conn: Mutex<Option<Connection>>,
}

impl RedisStore {
    pub fn new(settings: RedisSettings) -> Self {
        Self {
            settings,
            conn: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RedisSettings {
        &self.settings
    }

    fn connect(&self) -> StoreResult<Connection> {
        let settings = &self.settings;
        let addrs = (settings.host.as_str(), settings.port).to_socket_addrs()?;

        let mut last_err = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{}:{} resolved to no addresses", settings.host, settings.port),
        );
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, settings.connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = e,
            }
        }
        let stream = stream.ok_or(StoreFault::Unavailable(last_err))?;

        stream.set_nodelay(true)?;
        stream.set_read_timeout(settings.io_timeout)?;
        stream.set_write_timeout(settings.io_timeout)?;

        let mut conn = Connection {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        };

        if let Some(password) = &settings.password {
            conn.round_trip(&[b"AUTH", password.as_bytes()])?.into_ok()?;
        }
        if settings.database != 0 {
            let db = settings.database.to_string();
            conn.round_trip(&[b"SELECT", db.as_bytes()])?.into_ok()?;
        }

        debug!(host = %settings.host, port = settings.port, db = settings.database, "connected to store");
        Ok(conn)
    }

    /// Send one command and read its reply, (re)connecting if needed.
    fn call(&self, args: &[&[u8]]) -> StoreResult<Reply> {
        let mut guard = self.conn.lock();
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };

        match conn.round_trip(args) {
            Ok(reply) => {
                *guard = Some(conn);
                reply.into_result()
            }
            Err(fault) => {
                // The stream position is unknown after a failed read or write.
                warn!(command = %String::from_utf8_lossy(args[0]), error = %fault, "dropping store connection");
                Err(fault)
            }
        }
    }
}

impl KvStore for RedisStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.call(&[b"GET", key.as_bytes()])?.into_bulk()
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"MGET");
        args.extend(keys.iter().map(|k| k.as_bytes()));

        let values = self.call(&args)?.into_bulk_array()?;
        if values.len() != keys.len() {
            return Err(StoreFault::protocol(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }
        Ok(values)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.call(&[b"SET", key.as_bytes(), value])?.into_ok()
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        Ok(self.call(&[b"DEL", key.as_bytes()])?.into_integer()? > 0)
    }

    fn incr(&self, key: &str) -> StoreResult<i64> {
        self.call(&[b"INCR", key.as_bytes()])?.into_integer()
    }

    fn decr(&self, key: &str) -> StoreResult<i64> {
        self.call(&[b"DECR", key.as_bytes()])?.into_integer()
    }

    fn sadd(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        Ok(self.call(&[b"SADD", key.as_bytes(), member])?.into_integer()? > 0)
    }

    fn srem(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        Ok(self.call(&[b"SREM", key.as_bytes(), member])?.into_integer()? > 0)
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        Ok(self
            .call(&[b"SMEMBERS", key.as_bytes()])?
            .into_bulk_array()?
            .into_iter()
            .flatten()
            .collect())
    }

    fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.call(&[b"KEYS", pattern.as_bytes()])?
            .into_bulk_array()?
            .into_iter()
            .flatten()
            .map(|key| {
                String::from_utf8(key)
                    .map_err(|_| StoreFault::protocol("KEYS returned a non-UTF-8 key"))
            })
            .collect()
    }

    fn save(&self) -> StoreResult<()> {
        self.call(&[b"SAVE"])?.into_ok()
    }
}
