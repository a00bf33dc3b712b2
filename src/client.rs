use std::io::{BufWriter, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;

use crate::common::{Command, Reply, Request, Response};
use crate::store::TransactionReader;
use crate::{GeoError, Result};

/// One open connection to a store server.
pub(crate) struct Connection {
    reader: Deserializer<IoRead<TcpStream>>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    /// Connects to the server at the given address.
    pub fn open(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let reader_stream = TcpStream::connect_timeout(&addr, timeout)?;
        reader_stream.set_read_timeout(Some(timeout))?;
        reader_stream.set_write_timeout(Some(timeout))?;
        let writer_stream = reader_stream.try_clone()?;
        Ok(Self {
            reader: Deserializer::from_reader(reader_stream),
            writer: BufWriter::new(writer_stream),
        })
    }

    /// Sends one request and waits for its response.
    pub fn send(&mut self, request: &Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, request)?;
        self.writer.flush()?;

        match Response::deserialize(&mut self.reader)? {
            Response::Err(msg) => Err(GeoError::Store(msg)),
            response => Ok(response),
        }
    }

    /// Runs a single command and unwraps its reply.
    pub fn call(&mut self, command: Command) -> Result<Reply> {
        match self.send(&Request::Command(command))? {
            Response::Reply(Reply::Error(msg)) => Err(GeoError::Store(msg)),
            Response::Reply(reply) => Ok(reply),
            other => Err(unexpected(&other)),
        }
    }

    pub fn ping(&mut self) -> Result<()> {
        match self.send(&Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

pub(crate) fn unexpected(response: &Response) -> GeoError {
    GeoError::StringError(format!("Unexpected response: {response:?}"))
}

impl TransactionReader for Connection {
    fn list_len(&mut self, key: &str) -> Result<usize> {
        match self.call(Command::LLen {
            key: key.to_owned(),
        })? {
            Reply::Int(len) => Ok(len as usize),
            other => Err(GeoError::StringError(format!("Unexpected reply: {other:?}"))),
        }
    }
}
